use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::lazydjango::DatabaseInfo;
use crate::config::tools::ToolConfig;
use crate::error::ProjectError;
use crate::utils::process::ProcessRunner;

pub mod compose;
pub mod executor;

pub use executor::CommandExecutor;

/// Prints the `default` database entry as one JSON line.
const DATABASE_PROBE: &str = "import json; from django.conf import settings; \
db = settings.DATABASES.get('default', {}); \
print(json.dumps({k: str(db.get(k) or '') for k in ('ENGINE', 'NAME', 'HOST', 'PORT', 'USER')}))";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerContext {
    pub compose_file: Option<PathBuf>,
    /// Service that management commands are sent to.
    pub service: String,
}

/// Where a Django project lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub root_dir: PathBuf,
    pub manage_py: PathBuf,
    pub interpreter: String,
    pub has_docker: bool,
    pub docker: Option<DockerContext>,
    pub database: DatabaseInfo,
}

impl ProjectContext {
    /// A project without Docker, rooted at `root`.
    pub fn local(root: &Path, interpreter: &str) -> Self {
        Self {
            root_dir: root.to_path_buf(),
            manage_py: root.join("manage.py"),
            interpreter: interpreter.to_string(),
            has_docker: false,
            docker: None,
            database: DatabaseInfo::default(),
        }
    }

    pub fn compose_file(&self) -> Option<&Path> {
        self.docker.as_ref()?.compose_file.as_deref()
    }

    pub fn selected_service(&self) -> Option<&str> {
        self.docker.as_ref().map(|d| d.service.as_str())
    }

    pub(crate) fn set_selected_service(&mut self, service: &str) {
        if let Some(docker) = self.docker.as_mut() {
            docker.service = service.to_string();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscoverOptions {
    /// Ask Django itself for the database settings.
    pub introspect: bool,
    pub engine: Option<String>,
    pub database_name: Option<String>,
}

/// Nearest directory at or above `start` containing `manage.py`.
pub fn find_root(start: &Path) -> Result<PathBuf, ProjectError> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join("manage.py").is_file() {
            return Ok(dir);
        }
        if !dir.pop() {
            break;
        }
    }
    Err(ProjectError::NotFound {
        start: start.to_path_buf(),
    })
}

pub fn python_binary(runner: &dyn ProcessRunner) -> String {
    ["python", "python3"]
        .into_iter()
        .find(|name| runner.has_command(name))
        .unwrap_or("python")
        .to_string()
}

/// Locate the project and build an executor for it, resolving the database
/// from live settings, then the compose environment, then explicit overrides.
pub fn discover(
    start: &Path,
    runner: Arc<dyn ProcessRunner>,
    options: &DiscoverOptions,
) -> Result<CommandExecutor, ProjectError> {
    let root = find_root(start)?;
    let tools = ToolConfig::load(&root)?;

    let mut project = ProjectContext::local(&root, &python_binary(runner.as_ref()));
    let compose_file = compose::find_compose_file(&root);
    project.has_docker = compose_file.is_some() || root.join("Dockerfile").is_file();
    if let Some(file) = compose_file {
        let service = compose::find_django_service(&file, &tools.default_service);
        debug!(compose = %file.display(), service = %service, "using compose service");
        project.docker = Some(DockerContext {
            compose_file: Some(file),
            service,
        });
    }

    let mut executor = CommandExecutor::new(project, runner, tools);
    let mut database = DatabaseInfo::default();

    if options.introspect {
        match executor.run(&["shell", "-c", DATABASE_PROBE]) {
            Ok(output) => {
                if let Some(info) = parse_database_probe(&output) {
                    database = info;
                }
            }
            Err(err) => warn!(error = %err, "database introspection failed"),
        }
    }
    if let Some(file) = executor.project().compose_file() {
        apply_compose_environment(&mut database, &compose::extract_environment(file));
    }
    if let Some(engine) = &options.engine {
        database.engine = engine.clone();
        database.is_usable = true;
    }
    if let Some(name) = &options.database_name {
        database.name = name.clone();
    }

    executor.set_database(database);
    Ok(executor)
}

/// First line of `output` that looks like the probe's JSON object.
pub fn parse_database_probe(output: &str) -> Option<DatabaseInfo> {
    let line = output.lines().map(str::trim).find(|l| l.starts_with('{'))?;
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let field = |key: &str| match value.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    Some(DatabaseInfo {
        engine: field("ENGINE"),
        name: field("NAME"),
        host: field("HOST"),
        port: field("PORT"),
        user: field("USER"),
        is_usable: true,
    })
}

/// Fill database fields from compose-level `DB_*` variables.
pub fn apply_compose_environment(
    database: &mut DatabaseInfo,
    env: &std::collections::BTreeMap<String, String>,
) {
    let get = |key: &str| env.get(key).filter(|v| !v.is_empty()).cloned();

    if let Some(host) = get("DB_HOST") {
        database.host = host;
        database.is_usable = true;
    }
    if let Some(name) = get("DB_NAME") {
        database.name = name;
    }
    if let Some(port) = get("DB_PORT") {
        database.port = port;
    } else if !database.host.is_empty() && database.port.is_empty() {
        database.port = "5432".into();
    }
    if let Some(user) = get("DB_USER") {
        database.user = user;
    }
    if !database.host.is_empty() && database.engine.is_empty() {
        database.engine = "django.db.backends.postgresql".into();
    }
    if database.host.is_empty() && database.name.is_empty() {
        if let Some(local) = get("DB_LOCAL") {
            database.engine = "django.db.backends.sqlite3".into();
            database.name = local;
            database.is_usable = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::process::testing::{ScriptedRunner, ok};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::fs;

    #[test]
    fn finds_manage_py_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("manage.py"), "").unwrap();
        let nested = dir.path().join("blog").join("templates");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root(&nested).unwrap(), dir.path());
    }

    #[test]
    fn missing_manage_py_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_root(dir.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }

    #[test]
    fn probe_output_skips_startup_noise() {
        let output = "Loading .env\n{\"ENGINE\": \"django.db.backends.postgresql\", \"NAME\": \"shop\", \"HOST\": \"db\", \"PORT\": \"5432\", \"USER\": \"app\"}\n";
        let info = parse_database_probe(output).unwrap();
        assert_eq!(info.engine, "django.db.backends.postgresql");
        assert_eq!(info.name, "shop");
        assert_eq!(info.host, "db");
        assert!(info.is_usable);

        assert!(parse_database_probe("Traceback (most recent call last):\n").is_none());
        assert!(parse_database_probe("{broken").is_none());
    }

    #[test]
    fn db_host_implies_postgres_with_default_port() {
        let mut env = BTreeMap::new();
        env.insert("DB_HOST".to_string(), "postgres".to_string());
        env.insert("DB_NAME".to_string(), "shop".to_string());
        let mut db = DatabaseInfo::default();
        apply_compose_environment(&mut db, &env);

        assert_eq!(db.engine, "django.db.backends.postgresql");
        assert_eq!(db.port, "5432");
        assert!(db.is_usable);
    }

    #[test]
    fn db_local_implies_sqlite() {
        let mut env = BTreeMap::new();
        env.insert("DB_LOCAL".to_string(), "db.sqlite3".to_string());
        let mut db = DatabaseInfo::default();
        apply_compose_environment(&mut db, &env);

        assert_eq!(db.engine, "django.db.backends.sqlite3");
        assert_eq!(db.name, "db.sqlite3");
    }

    #[test]
    fn discover_builds_docker_context_and_introspects() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("manage.py"), "").unwrap();
        fs::write(
            dir.path().join("compose.yaml"),
            "services:\n  db:\n    image: postgres:16\n  django:\n    command: ./manage.py runserver\n",
        )
        .unwrap();
        let runner = Arc::new(
            ScriptedRunner::new()
                .with_commands(&["docker", "python3"])
                .respond(|inv| (inv.args == ["info"]).then(|| ok("")).flatten())
                .respond(|inv| {
                    inv.args.iter().any(|a| a == "shell").then(|| {
                        ok("{\"ENGINE\": \"django.db.backends.postgresql\", \"NAME\": \"app\", \"HOST\": \"db\", \"PORT\": \"\", \"USER\": \"u\"}")
                    }).flatten()
                }),
        );

        let options = DiscoverOptions {
            introspect: true,
            ..DiscoverOptions::default()
        };
        let exec = discover(dir.path(), runner.clone(), &options).unwrap();
        let project = exec.project();

        assert!(project.has_docker);
        assert_eq!(project.interpreter, "python3");
        assert_eq!(project.selected_service(), Some("django"));
        assert_eq!(project.database.name, "app");
        assert!(project.database.is_usable);
        let shell = runner.calls().into_iter().find(|c| c.args.iter().any(|a| a == "shell")).unwrap();
        assert_eq!(shell.program, "docker");
    }

    #[test]
    fn overrides_win_without_introspection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("manage.py"), "").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let options = DiscoverOptions {
            introspect: false,
            engine: Some("django.db.backends.sqlite3".into()),
            database_name: Some("db.sqlite3".into()),
        };
        let exec = discover(dir.path(), runner.clone(), &options).unwrap();

        assert!(!exec.project().has_docker);
        assert_eq!(exec.project().database.engine, "django.db.backends.sqlite3");
        assert!(runner.calls().is_empty());
    }
}
