//! Shared plumbing for the native dump/restore tools: where they run, which
//! password they get, and moving payloads in and out of containers.

use std::path::Path;

use tracing::{debug, info};

use super::DriverContext;
use crate::config::tools::EngineTools;
use crate::error::DriverError;
use crate::utils::process::Invocation;

/// Prints the `default` database password as one JSON line.
const PASSWORD_PROBE: &str = "import json; from django.conf import settings; \
print(json.dumps({'password': str(settings.DATABASES.get('default', {}).get('PASSWORD') or '')}))";

/// Where a native tool runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Local,
    Container(String),
}

/// Database container for `tools`, only for Docker-managed projects: the
/// compose service's container first, then any running container of the image.
pub fn locate(cx: &DriverContext<'_>, tools: &EngineTools) -> Target {
    let project = cx.executor.project();
    if !project.has_docker {
        return Target::Local;
    }
    let runner = cx.executor.runner().clone();
    let run = |args: Vec<String>| -> Option<String> {
        runner
            .run_checked(&Invocation::new("docker", args))
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|out| !out.is_empty())
    };

    if let Some(compose) = project.compose_file() {
        let id = run(vec![
            "compose".into(),
            "-f".into(),
            compose.display().to_string(),
            "ps".into(),
            "-q".into(),
            tools.service.clone(),
        ]);
        if let Some(id) = id.and_then(|out| out.lines().next().map(str::to_string)) {
            let name = run(vec![
                "inspect".into(),
                "--format".into(),
                "{{.Name}}".into(),
                id,
            ]);
            if let Some(name) = name {
                let name = name.trim_start_matches('/').to_string();
                debug!(container = %name, "found database container via compose");
                return Target::Container(name);
            }
        }
    }

    let by_image = run(vec![
        "ps".into(),
        "--filter".into(),
        format!("ancestor={}", tools.image),
        "--format".into(),
        "{{.Names}}".into(),
    ]);
    match by_image.and_then(|out| out.lines().next().map(str::to_string)) {
        Some(name) => {
            debug!(container = %name, "found database container via image");
            Target::Container(name)
        }
        None => Target::Local,
    }
}

/// Database password: the configured environment variables in order, then the
/// live Django settings, then empty.
pub fn resolve_password(cx: &mut DriverContext<'_>) -> String {
    let names = cx.executor.tools().password_env.clone();
    for name in &names {
        if let Some(value) = (cx.env)(name).filter(|v| !v.is_empty()) {
            debug!(source = %name, "database password from environment");
            return value;
        }
    }
    match cx.executor.run(&["shell", "-c", PASSWORD_PROBE]) {
        Ok(output) => parse_password_probe(&output),
        Err(err) => {
            info!(error = %err, "could not read database password from settings");
            String::new()
        }
    }
}

/// Password from the first JSON line of the probe output; empty when there is
/// none, so shell banners and warnings never pass for a password.
fn parse_password_probe(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
        .and_then(|v| v.get("password")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Flag/value pairs, leaving out flags whose value is empty.
pub fn connection_args(pairs: &[(&str, &str)]) -> Vec<String> {
    let mut args = Vec::new();
    for (flag, value) in pairs {
        if !value.is_empty() {
            args.push(flag.to_string());
            args.push(value.to_string());
        }
    }
    args
}

pub struct ToolRun<'a> {
    pub program: &'a str,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Local runs only; containers read payloads from their own filesystem.
    pub stdin: Option<&'a Path>,
}

pub fn run_tool(cx: &DriverContext<'_>, target: &Target, tool: ToolRun<'_>) -> Result<String, DriverError> {
    let invocation = match target {
        Target::Local => {
            let mut inv = Invocation::new(tool.program, tool.args);
            for (k, v) in tool.env {
                inv = inv.env(k, v);
            }
            if let Some(stdin) = tool.stdin {
                inv = inv.stdin_file(stdin);
            }
            inv.current_dir(&cx.executor.project().root_dir)
        }
        Target::Container(container) => {
            let mut args: Vec<String> = vec!["exec".into()];
            for (k, v) in tool.env {
                args.push("-e".into());
                args.push(format!("{}={}", k, v));
            }
            args.push(container.clone());
            args.push(tool.program.to_string());
            args.extend(tool.args);
            Invocation::new("docker", args)
        }
    };
    cx.executor
        .runner()
        .run_checked(&invocation)
        .map_err(|source| DriverError::command(tool.program, source))
}

pub fn copy_into(cx: &DriverContext<'_>, container: &str, local: &Path, remote: &str) -> Result<(), DriverError> {
    let inv = Invocation::new(
        "docker",
        [
            "cp".to_string(),
            local.display().to_string(),
            format!("{}:{}", container, remote),
        ],
    );
    cx.executor
        .runner()
        .run_checked(&inv)
        .map(|_| ())
        .map_err(|source| DriverError::command("copy payload into container", source))
}

pub fn copy_out(cx: &DriverContext<'_>, container: &str, remote: &str, local: &Path) -> Result<(), DriverError> {
    let inv = Invocation::new(
        "docker",
        [
            "cp".to_string(),
            format!("{}:{}", container, remote),
            local.display().to_string(),
        ],
    );
    cx.executor
        .runner()
        .run_checked(&inv)
        .map(|_| ())
        .map_err(|source| DriverError::command("copy payload out of container", source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tools::ToolConfig;
    use crate::project::{CommandExecutor, DockerContext, ProjectContext};
    use crate::utils::process::testing::{ScriptedRunner, fail, ok};
    use std::sync::Arc;

    fn executor(root: &Path, docker: bool, runner: Arc<ScriptedRunner>) -> CommandExecutor {
        let mut project = ProjectContext::local(root, "python");
        project.has_docker = docker;
        if docker {
            project.docker = Some(DockerContext {
                compose_file: Some(root.join("docker-compose.yml")),
                service: "web".into(),
            });
        }
        CommandExecutor::new(project, runner, ToolConfig::default())
    }

    #[test]
    fn password_prefers_environment_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let mut exec = executor(dir.path(), false, runner.clone());
        let env = |k: &str| match k {
            "POSTGRES_PASSWORD" => Some("pg-secret".to_string()),
            "MYSQL_PASSWORD" => Some("my-secret".to_string()),
            "DB_PASSWORD" => Some(String::new()),
            _ => None,
        };
        let mut cx = DriverContext { executor: &mut exec, env: &env };

        assert_eq!(resolve_password(&mut cx), "pg-secret");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn password_falls_back_to_settings_then_empty() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().respond(|inv| {
            inv.args.iter().any(|a| a == "shell").then(|| ok("6 objects imported\n{\"password\": \"hunter2\"}\n")).flatten()
        }));
        let mut exec = executor(dir.path(), false, runner);
        let env = |_: &str| -> Option<String> { None };
        let mut cx = DriverContext { executor: &mut exec, env: &env };
        assert_eq!(resolve_password(&mut cx), "hunter2");

        let mut exec = executor(dir.path(), false, Arc::new(ScriptedRunner::new()));
        let mut cx = DriverContext { executor: &mut exec, env: &env };
        assert_eq!(resolve_password(&mut cx), "");
    }

    #[test]
    fn empty_settings_password_ignores_shell_banner() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().respond(|inv| {
            inv.args
                .iter()
                .any(|a| a == "shell")
                .then(|| ok("6 objects imported automatically (use -v 2 for details).\n\n{\"password\": \"\"}\nRuntimeWarning: naive datetime\n"))
                .flatten()
        }));
        let mut exec = executor(dir.path(), false, runner);
        let env = |_: &str| -> Option<String> { None };
        let mut cx = DriverContext { executor: &mut exec, env: &env };
        assert_eq!(resolve_password(&mut cx), "");

        assert_eq!(parse_password_probe("6 objects imported automatically (use -v 2 for details).\n\n"), "");
        assert_eq!(parse_password_probe("{broken\n{\"password\": \"p{w\"}\n"), "p{w");
    }

    #[test]
    fn locate_uses_compose_container_name() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().respond(|inv| match inv.args.first().map(String::as_str) {
            Some("compose") => ok("f00dfeed\n"),
            Some("inspect") => ok("/shop-postgres-1\n"),
            _ => None,
        }));
        let mut exec = executor(dir.path(), true, runner);
        let env = |_: &str| -> Option<String> { None };
        let cx = DriverContext { executor: &mut exec, env: &env };

        let target = locate(&cx, &ToolConfig::default().postgres);
        assert_eq!(target, Target::Container("shop-postgres-1".into()));
    }

    #[test]
    fn locate_falls_back_to_image_then_local() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().respond(|inv| match inv.args.first().map(String::as_str) {
            Some("compose") => ok(""),
            Some("ps") => ok("legacy_mysql\nother\n"),
            _ => None,
        }));
        let mut exec = executor(dir.path(), true, runner);
        let env = |_: &str| -> Option<String> { None };
        let cx = DriverContext { executor: &mut exec, env: &env };
        assert_eq!(locate(&cx, &ToolConfig::default().mysql), Target::Container("legacy_mysql".into()));

        let runner = Arc::new(ScriptedRunner::new().respond(|_| fail("Cannot connect to the Docker daemon")));
        let mut exec = executor(dir.path(), true, runner);
        let cx = DriverContext { executor: &mut exec, env: &env };
        assert_eq!(locate(&cx, &ToolConfig::default().mysql), Target::Local);
    }

    #[test]
    fn container_runs_pass_env_with_dash_e() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().respond(|_| ok("")));
        let mut exec = executor(dir.path(), true, runner.clone());
        let env = |_: &str| -> Option<String> { None };
        let cx = DriverContext { executor: &mut exec, env: &env };

        run_tool(
            &cx,
            &Target::Container("db".into()),
            ToolRun {
                program: "pg_dump",
                args: vec!["-d".into(), "shop".into()],
                env: vec![("PGPASSWORD".into(), "pw".into())],
                stdin: None,
            },
        )
        .unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.program, "docker");
        assert_eq!(call.args, ["exec", "-e", "PGPASSWORD=pw", "db", "pg_dump", "-d", "shop"]);
    }

    #[test]
    fn empty_connection_values_are_omitted() {
        assert_eq!(
            connection_args(&[("-h", "localhost"), ("-p", ""), ("-U", "app")]),
            ["-h", "localhost", "-U", "app"]
        );
    }
}
