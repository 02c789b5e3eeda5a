use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::CommandError;

/// One external program call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// File streamed to the child's stdin.
    pub stdin: Option<PathBuf>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// `program arg1 arg2 ...`, for logs and error messages.
    pub fn display(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Combined stdout+stderr and exit status of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub output: String,
    pub status: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into `CommandError::Failed`, keeping the output verbatim.
    pub fn into_result(self, program: &str) -> Result<String, CommandError> {
        if self.success() {
            Ok(self.output)
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                status: self.status,
                output: self.output,
            })
        }
    }
}

pub trait ProcessRunner: Send + Sync {
    /// Run to completion. `Err` only when the program could not be started.
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, CommandError>;

    /// Whether `name` resolves to an executable on PATH.
    fn has_command(&self, name: &str) -> bool;

    /// Run and treat a non-zero exit as an error.
    fn run_checked(&self, invocation: &Invocation) -> Result<String, CommandError> {
        self.run(invocation)?.into_result(&invocation.program)
    }
}

/// Runs real processes through `std::process::Command`.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, CommandError> {
        debug!(command = %invocation.display(), "running");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        match &invocation.stdin {
            Some(path) => {
                let file = File::open(path).map_err(|source| CommandError::Spawn {
                    program: invocation.program.clone(),
                    source,
                })?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        let out = cmd.output().map_err(|source| CommandError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(ProcessOutput {
            output: text,
            status: out.status.code(),
        })
    }

    fn has_command(&self, name: &str) -> bool {
        find_in_path(name).is_some()
    }
}

/// Simple `which` using PATH.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let path = Path::new(name);
        return path.is_file().then(|| path.to_path_buf());
    }
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .flat_map(|dir| executable_names(name).into_iter().map(move |n| dir.join(n)))
            .find(|p| p.is_file())
    })
}

fn executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{}.exe", name), name.to_string()]
    } else {
        vec![name.to_string()]
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_zero_exit_keeps_output_verbatim() {
        let out = ProcessOutput {
            output: "CommandError: No migrations to apply\n".into(),
            status: Some(2),
        };
        let err = out.into_result("python").unwrap_err();
        assert_eq!(err.output(), "CommandError: No migrations to apply\n");
        assert!(err.to_string().contains("exit status 2"));
    }

    #[test]
    fn display_joins_program_and_args() {
        let inv = Invocation::new("docker", ["compose", "exec", "-T", "web"]);
        assert_eq!(inv.display(), "docker compose exec -T web");
    }

    #[test]
    fn missing_binary_is_a_spawn_error() {
        let inv = Invocation::new("definitely-not-a-real-binary-4242", Vec::<String>::new());
        let err = SystemRunner.run(&inv).unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
        assert!(!SystemRunner.has_command("definitely-not-a-real-binary-4242"));
    }
}
