use std::path::Path;

use crate::error::DriverError;
use crate::project::CommandExecutor;

pub mod generic;
pub mod mysql;
mod native;
pub mod postgres;
pub mod selector;
pub mod sqlite;

use generic::GenericDriver;
use mysql::MySqlDriver;
use postgres::PostgresDriver;
use sqlite::SqliteDriver;

/// Looks up an environment variable; injectable so tests don't touch the process env.
pub type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// What a driver gets to work with for one dump or restore.
pub struct DriverContext<'a> {
    pub executor: &'a mut CommandExecutor,
    pub env: &'a EnvLookup,
}

pub trait SnapshotDriver {
    fn name(&self) -> &'static str;

    /// Payload file extension, including the dot.
    fn extension(&self) -> &'static str;

    /// Write the current database contents to `out`.
    fn dump(&self, cx: &mut DriverContext<'_>, out: &Path) -> Result<(), DriverError>;

    /// Replace the current database contents with `payload`.
    fn restore(&self, cx: &mut DriverContext<'_>, payload: &Path) -> Result<(), DriverError>;
}

/// The closed set of snapshot strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sqlite(SqliteDriver),
    Postgres(PostgresDriver),
    MySql(MySqlDriver),
    Generic(GenericDriver),
}

impl Strategy {
    fn driver(&self) -> &dyn SnapshotDriver {
        match self {
            Strategy::Sqlite(d) => d,
            Strategy::Postgres(d) => d,
            Strategy::MySql(d) => d,
            Strategy::Generic(d) => d,
        }
    }
}

impl SnapshotDriver for Strategy {
    fn name(&self) -> &'static str {
        self.driver().name()
    }

    fn extension(&self) -> &'static str {
        self.driver().extension()
    }

    fn dump(&self, cx: &mut DriverContext<'_>, out: &Path) -> Result<(), DriverError> {
        self.driver().dump(cx, out)
    }

    fn restore(&self, cx: &mut DriverContext<'_>, payload: &Path) -> Result<(), DriverError> {
        self.driver().restore(cx, payload)
    }
}
