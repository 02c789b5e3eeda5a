use std::path::Path;

use super::native::{self, Target, ToolRun};
use super::{DriverContext, SnapshotDriver};
use crate::error::DriverError;

/// `pg_dump` / `psql`, locally or inside the database container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    fn connection(cx: &DriverContext<'_>) -> Vec<String> {
        let db = &cx.executor.project().database;
        native::connection_args(&[
            ("-h", &db.host),
            ("-p", &db.port),
            ("-U", &db.user),
            ("-d", &db.name),
        ])
    }
}

impl SnapshotDriver for PostgresDriver {
    fn name(&self) -> &'static str { "postgresql" }

    fn extension(&self) -> &'static str { ".sql" }

    fn dump(&self, cx: &mut DriverContext<'_>, out: &Path) -> Result<(), DriverError> {
        let tools = cx.executor.tools().postgres.clone();
        let password = native::resolve_password(cx);
        let target = native::locate(cx, &tools);
        let tmp = cx.executor.tools().container_tmp_path.clone();

        let file = match &target {
            Target::Local => out.display().to_string(),
            Target::Container(_) => tmp.clone(),
        };
        let mut args = Self::connection(cx);
        args.extend(["-f".to_string(), file, "--clean".into(), "--if-exists".into()]);

        native::run_tool(
            cx,
            &target,
            ToolRun {
                program: &tools.dump,
                args,
                env: vec![("PGPASSWORD".into(), password)],
                stdin: None,
            },
        )?;
        if let Target::Container(container) = &target {
            native::copy_out(cx, container, &tmp, out)?;
        }
        Ok(())
    }

    fn restore(&self, cx: &mut DriverContext<'_>, payload: &Path) -> Result<(), DriverError> {
        let tools = cx.executor.tools().postgres.clone();
        let password = native::resolve_password(cx);
        let target = native::locate(cx, &tools);

        let file = match &target {
            Target::Local => payload.display().to_string(),
            Target::Container(container) => {
                let tmp = cx.executor.tools().container_tmp_path.clone();
                native::copy_into(cx, container, payload, &tmp)?;
                tmp
            }
        };
        let mut args = Self::connection(cx);
        args.extend(["-f".to_string(), file]);

        native::run_tool(
            cx,
            &target,
            ToolRun {
                program: &tools.restore,
                args,
                env: vec![("PGPASSWORD".into(), password)],
                stdin: None,
            },
        )?;
        Ok(())
    }
}
