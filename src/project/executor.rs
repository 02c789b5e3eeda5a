use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ProjectContext;
use super::compose::django_service_candidates;
use crate::config::lazydjango::DatabaseInfo;
use crate::config::tools::ToolConfig;
use crate::error::CommandError;
use crate::utils::process::{Invocation, ProcessRunner};

/// Error text that means `docker compose exec` could not use the service at
/// all, as opposed to the management command itself failing.
const UNUSABLE_SERVICE_HINTS: [&str; 7] = [
    "is not running",
    "no such service",
    "service not found",
    "container is not running",
    "cannot exec in a stopped state",
    "oci runtime exec failed",
    "executable file not found in $path",
];

pub fn is_unusable_service_failure(err: &CommandError) -> bool {
    let text = format!("{}\n{}", err.output(), err).to_lowercase();
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    UNUSABLE_SERVICE_HINTS.iter().any(|hint| text.contains(hint))
}

/// Runs management commands for one project, locally or through Docker Compose.
///
/// Owns the `ProjectContext` for the session. The selected service is the only
/// field it changes, and only after a command succeeded against the new one.
pub struct CommandExecutor {
    project: ProjectContext,
    runner: Arc<dyn ProcessRunner>,
    tools: ToolConfig,
    docker_reachable: Option<bool>,
}

impl CommandExecutor {
    pub fn new(project: ProjectContext, runner: Arc<dyn ProcessRunner>, tools: ToolConfig) -> Self {
        Self {
            project,
            runner,
            tools,
            docker_reachable: None,
        }
    }

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    pub fn tools(&self) -> &ToolConfig {
        &self.tools
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    pub fn set_database(&mut self, database: DatabaseInfo) {
        self.project.database = database;
    }

    /// `docker info` succeeds. Probed once per executor.
    pub fn docker_reachable(&mut self) -> bool {
        if let Some(reachable) = self.docker_reachable {
            return reachable;
        }
        let reachable = self
            .runner
            .run(&Invocation::new("docker", ["info"]))
            .map(|out| out.success())
            .unwrap_or(false);
        debug!(reachable, "probed docker daemon");
        self.docker_reachable = Some(reachable);
        reachable
    }

    /// Run `manage.py <args>` and return its combined output.
    ///
    /// Under Docker, a failure that looks like an unusable service is retried
    /// against the other ranked compose services; the first one that works is
    /// kept for later calls. Any other failure is returned as is.
    pub fn run<S: AsRef<str>>(&mut self, args: &[S]) -> Result<String, CommandError> {
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();

        let selected = match self.project.docker.as_ref() {
            Some(docker) if self.project.has_docker && !docker.service.trim().is_empty() => {
                docker.service.clone()
            }
            _ => return self.run_local(&args),
        };
        if !self.docker_reachable() {
            debug!("docker unreachable, running locally");
            return self.run_local(&args);
        }
        let Some(first) = self.docker_invocation(&selected, &args) else {
            warn!("neither docker nor docker-compose found, running locally");
            return self.run_local(&args);
        };

        let mut last = match self.runner.run_checked(&first) {
            Ok(output) => return Ok(output),
            Err(err) if !is_unusable_service_failure(&err) => return Err(err),
            Err(err) => err,
        };
        info!(service = %selected, "service unusable, trying alternates");

        let candidates = self
            .project
            .compose_file()
            .map(django_service_candidates)
            .unwrap_or_default();
        for service in candidates {
            let service = service.trim();
            if service.is_empty() || service == selected {
                continue;
            }
            let Some(invocation) = self.docker_invocation(service, &args) else {
                break;
            };
            match self.runner.run_checked(&invocation) {
                Ok(output) => {
                    info!(from = %selected, to = %service, "promoted docker service");
                    self.project.set_selected_service(service);
                    return Ok(output);
                }
                Err(err) if !is_unusable_service_failure(&err) => return Err(err),
                Err(err) => {
                    debug!(service, error = %err, "alternate service unusable");
                    last = err;
                }
            }
        }

        Err(last)
    }

    fn run_local(&self, args: &[String]) -> Result<String, CommandError> {
        let invocation = self.local_invocation(args);
        self.runner.run_checked(&invocation)
    }

    pub fn local_invocation(&self, args: &[String]) -> Invocation {
        let mut all = vec![self.project.manage_py.display().to_string()];
        all.extend(args.iter().cloned());
        Invocation::new(self.project.interpreter.clone(), all).current_dir(&self.project.root_dir)
    }

    /// `docker compose [-f file] exec -T <service> python manage.py <args>`,
    /// or the `docker-compose` v1 form. `None` when neither CLI is installed.
    pub fn docker_invocation(&self, service: &str, args: &[String]) -> Option<Invocation> {
        let mut compose_args: Vec<String> = vec!["compose".into()];
        if let Some(file) = self.project.compose_file() {
            compose_args.push("-f".into());
            compose_args.push(file.display().to_string());
        }
        compose_args.extend([
            "exec".to_string(),
            "-T".to_string(),
            service.to_string(),
            self.tools.container_interpreter.clone(),
            self.tools.container_entry_point.clone(),
        ]);
        compose_args.extend(args.iter().cloned());

        let invocation = if self.runner.has_command("docker") {
            Invocation::new("docker", compose_args)
        } else if self.runner.has_command("docker-compose") {
            Invocation::new("docker-compose", compose_args.into_iter().skip(1))
        } else {
            return None;
        };
        Some(invocation.current_dir(&self.project.root_dir))
    }
}
