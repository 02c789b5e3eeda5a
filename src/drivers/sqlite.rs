use std::path::{Path, PathBuf};

use tracing::debug;

use super::{DriverContext, SnapshotDriver};
use crate::error::DriverError;
use crate::utils::io::copy_file;

/// Copies the database file itself. Under Docker the file is assumed to be
/// bind-mounted, so no container work is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    /// Database file, relative names resolved against the project root.
    pub fn database_path(cx: &DriverContext<'_>) -> PathBuf {
        let project = cx.executor.project();
        let name = Path::new(&project.database.name);
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            project.root_dir.join(name)
        }
    }
}

impl SnapshotDriver for SqliteDriver {
    fn name(&self) -> &'static str { "sqlite" }

    fn extension(&self) -> &'static str { ".sqlite3" }

    fn dump(&self, cx: &mut DriverContext<'_>, out: &Path) -> Result<(), DriverError> {
        let db = Self::database_path(cx);
        debug!(from = %db.display(), to = %out.display(), "copying sqlite database");
        copy_file(&db, out).map_err(|source| DriverError::Io {
            action: "copy database",
            path: db,
            source,
        })?;
        Ok(())
    }

    fn restore(&self, cx: &mut DriverContext<'_>, payload: &Path) -> Result<(), DriverError> {
        let db = Self::database_path(cx);
        debug!(from = %payload.display(), to = %db.display(), "restoring sqlite database");
        copy_file(payload, &db).map_err(|source| DriverError::Io {
            action: "restore database",
            path: payload.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tools::ToolConfig;
    use crate::project::{CommandExecutor, ProjectContext};
    use crate::utils::process::testing::ScriptedRunner;
    use std::fs;
    use std::sync::Arc;

    fn executor(root: &Path, name: &str) -> CommandExecutor {
        let mut project = ProjectContext::local(root, "python");
        project.database.engine = "django.db.backends.sqlite3".into();
        project.database.name = name.into();
        CommandExecutor::new(project, Arc::new(ScriptedRunner::new()), ToolConfig::default())
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn relative_name_resolves_against_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut exec = executor(dir.path(), "db.sqlite3");
        let cx = DriverContext { executor: &mut exec, env: &no_env };
        assert_eq!(SqliteDriver::database_path(&cx), dir.path().join("db.sqlite3"));

        let abs = dir.path().join("elsewhere.sqlite3");
        let mut exec = executor(dir.path(), &abs.display().to_string());
        let cx = DriverContext { executor: &mut exec, env: &no_env };
        assert_eq!(SqliteDriver::database_path(&cx), abs);
    }

    #[test]
    fn dump_then_restore_is_byte_exact() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("db.sqlite3");
        fs::write(&db, b"SQLite format 3\0\x01\x02").unwrap();
        let mut exec = executor(dir.path(), "db.sqlite3");
        let mut cx = DriverContext { executor: &mut exec, env: &no_env };
        let out = dir.path().join("snaps").join("1.sqlite3");

        SqliteDriver.dump(&mut cx, &out).unwrap();
        fs::write(&db, b"modified").unwrap();
        SqliteDriver.restore(&mut cx, &out).unwrap();

        assert_eq!(fs::read(&db).unwrap(), b"SQLite format 3\0\x01\x02");
    }

    #[test]
    fn missing_database_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut exec = executor(dir.path(), "absent.sqlite3");
        let mut cx = DriverContext { executor: &mut exec, env: &no_env };

        let err = SqliteDriver.dump(&mut cx, &dir.path().join("1.sqlite3")).unwrap_err();
        assert!(matches!(err, DriverError::Io { action: "copy database", .. }));
    }
}
