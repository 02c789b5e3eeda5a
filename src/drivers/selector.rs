use std::path::Path;

use tracing::debug;

use super::generic::GenericDriver;
use super::mysql::MySqlDriver;
use super::postgres::PostgresDriver;
use super::sqlite::SqliteDriver;
use super::Strategy;
use crate::config::lazydjango::{EngineFamily, Snapshot};

/// Whether to use Django's own exporter instead of native tools.
///
/// Docker-managed projects always keep native tools, which are expected inside
/// the database container. Locally, Postgres and MySQL fall back only when the
/// dump binary is missing. SQLite never falls back; unknown engines always do.
pub fn should_use_django_dump_fallback(engine: &str, docker_managed: bool, has_dump_tool: bool) -> bool {
    match EngineFamily::from_engine(engine) {
        EngineFamily::Sqlite => false,
        EngineFamily::Postgres | EngineFamily::MySql => !docker_managed && !has_dump_tool,
        EngineFamily::Other => true,
    }
}

pub fn snapshot_file_extension(engine: &str, fallback: bool) -> &'static str {
    match EngineFamily::from_engine(engine) {
        EngineFamily::Sqlite => ".sqlite3",
        _ if fallback => ".json",
        EngineFamily::Postgres | EngineFamily::MySql => ".sql",
        EngineFamily::Other => ".json",
    }
}

/// Strategy for a new snapshot. `dump_tool` reports whether the family's dump
/// binary is on the local PATH; it is only asked for local Postgres/MySQL.
pub fn select_for_create(
    engine: &str,
    docker_managed: bool,
    dump_tool: impl FnOnce(EngineFamily) -> bool,
) -> Strategy {
    let family = EngineFamily::from_engine(engine);
    let has_dump_tool = match family {
        EngineFamily::Postgres | EngineFamily::MySql if !docker_managed => dump_tool(family),
        _ => false,
    };
    let strategy = if should_use_django_dump_fallback(engine, docker_managed, has_dump_tool) {
        Strategy::Generic(GenericDriver)
    } else {
        native(family)
    };
    debug!(engine, docker_managed, has_dump_tool, ?strategy, "selected snapshot strategy");
    strategy
}

/// Strategy that can read an existing snapshot's payload: JSON payloads always
/// go through `loaddata`, anything else by the recorded engine.
pub fn select_for_restore(snapshot: &Snapshot) -> Strategy {
    let is_json = Path::new(&snapshot.file_path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return Strategy::Generic(GenericDriver);
    }
    native(EngineFamily::from_engine(&snapshot.database_engine))
}

fn native(family: EngineFamily) -> Strategy {
    match family {
        EngineFamily::Sqlite => Strategy::Sqlite(SqliteDriver),
        EngineFamily::Postgres => Strategy::Postgres(PostgresDriver),
        EngineFamily::MySql => Strategy::MySql(MySqlDriver),
        EngineFamily::Other => Strategy::Generic(GenericDriver),
    }
}
