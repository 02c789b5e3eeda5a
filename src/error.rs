use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to run an external program, or a program that ran and reported failure.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} failed ({}): {}", describe_status(.status), trimmed(.output))]
    Failed {
        program: String,
        status: Option<i32>,
        output: String,
    },
}

impl CommandError {
    /// Combined output of the failed call, or the launch error text.
    pub fn output(&self) -> String {
        match self {
            CommandError::Spawn { source, .. } => source.to_string(),
            CommandError::Failed { output, .. } => output.clone(),
        }
    }
}

fn trimmed(output: &str) -> &str {
    output.trim()
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("no Django project found from {} (no manage.py)", .start.display())]
    NotFound { start: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid tool configuration {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by a single snapshot strategy while dumping or restoring.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{step} failed: {source}")]
    Command {
        step: String,
        #[source]
        source: CommandError,
    },

    #[error("dumpdata output is not a JSON fixture ({reason}): {}", trimmed(.output))]
    InvalidFixture { reason: String, output: String },

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DriverError {
    pub fn command(step: impl Into<String>, source: CommandError) -> Self {
        DriverError::Command {
            step: step.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot '{id}' not found: {source}")]
    NotFound {
        id: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid snapshot metadata for '{id}': {source}")]
    InvalidMetadata {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to create snapshot: {source}")]
    Dump {
        #[source]
        source: DriverError,
    },

    #[error("failed to restore snapshot: {source}")]
    Restore {
        #[source]
        source: DriverError,
    },

    #[error("failed to save metadata {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode snapshot metadata: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
