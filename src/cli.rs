use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// lazy-django: database snapshots for Django projects, local or in Docker Compose
#[derive(Parser, Debug)]
#[command(name = "lazy-django", version, about = "Snapshot and restore a Django project's database.", long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Directory inside the Django project (defaults to the current directory)
    #[arg(short = 'p', long = "project", global = true, value_name = "dir")]
    pub project: Option<PathBuf>,

    /// Show debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Don't ask Django for its database settings
    #[arg(long, global = true)]
    pub no_introspect: bool,

    /// Database engine override (e.g. django.db.backends.postgresql)
    #[arg(long, global = true, value_name = "engine")]
    pub engine: Option<String>,

    /// Database name override; for SQLite, the database file
    #[arg(long = "db-name", global = true, value_name = "name")]
    pub db_name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a snapshot of the current database
    Snapshot {
        /// Name for the snapshot (defaults to snapshot-<timestamp>)
        name: Option<String>,
    },

    /// List snapshots, newest first
    List,

    /// Show one snapshot's metadata
    Show {
        /// Snapshot ID
        id: String,
    },

    /// Restore the database from a snapshot
    Restore {
        /// Snapshot ID
        #[arg(required_unless_present = "latest", conflicts_with = "latest")]
        id: Option<String>,

        /// Restore the most recent snapshot
        #[arg(long)]
        latest: bool,

        /// Don't ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Delete a snapshot's payload and metadata
    Delete {
        /// Snapshot ID
        id: String,

        /// Don't ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Run a manage.py command the way snapshots run them
    Run {
        /// Arguments passed to manage.py
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Rank the compose services by how likely they run Django
    Services,

    /// Show the detected project, database and snapshot strategy
    Info,

    /// Print CLI version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_passes_flags_through() {
        let cli = Cli::try_parse_from(["lazy-django", "run", "--", "migrate", "--plan"]).unwrap();
        match cli.command {
            Commands::Run { args } => assert_eq!(args, ["migrate", "--plan"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn restore_needs_id_or_latest() {
        assert!(Cli::try_parse_from(["lazy-django", "restore"]).is_err());
        assert!(Cli::try_parse_from(["lazy-django", "restore", "1", "--latest"]).is_err());
        let cli = Cli::try_parse_from(["lazy-django", "restore", "--latest", "-y"]).unwrap();
        assert!(matches!(cli.command, Commands::Restore { id: None, latest: true, yes: true }));
    }

    #[test]
    fn global_flags_follow_subcommand() {
        let cli = Cli::try_parse_from(["lazy-django", "list", "--engine", "sqlite3", "-p", "/srv/app"]).unwrap();
        assert_eq!(cli.engine.as_deref(), Some("sqlite3"));
        assert_eq!(cli.project, Some(PathBuf::from("/srv/app")));
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
