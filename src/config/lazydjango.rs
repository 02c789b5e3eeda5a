use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Persisted sidecar for one snapshot, stored as `<id>.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub git_branch: String,
    pub git_commit: String,
    /// Engine string as it was when the snapshot was taken.
    pub database_engine: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub applied_migrations: Vec<String>,
    pub file_path: String,
    pub metadata_path: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Connection details for the project's `default` database.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub engine: String,
    pub name: String,
    pub host: String,
    pub port: String,
    pub user: String,
    /// Set once live introspection or environment resolution filled the fields in.
    #[serde(skip)]
    pub is_usable: bool,
}

/// Database families with a dedicated snapshot strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFamily {
    Postgres,
    MySql,
    Sqlite,
    Other,
}

impl EngineFamily {
    /// Substring match, so `django.db.backends.postgresql` and friends all map.
    pub fn from_engine(engine: &str) -> Self {
        let engine = engine.to_lowercase();
        if engine.contains("postgresql") {
            EngineFamily::Postgres
        } else if engine.contains("mysql") {
            EngineFamily::MySql
        } else if engine.contains("sqlite") {
            EngineFamily::Sqlite
        } else {
            EngineFamily::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn metadata_round_trips_through_json() {
        let snap = Snapshot {
            id: "1718000000123456789".into(),
            name: "before-refactor".into(),
            timestamp: Utc.timestamp_nanos(1_718_000_000_123_456_789),
            git_branch: "main".into(),
            git_commit: "abc123".into(),
            database_engine: "django.db.backends.postgresql".into(),
            applied_migrations: vec!["blog.0001_initial".into(), "shop.0002_price".into()],
            file_path: "/p/.lazy-django/snapshots/1718000000123456789.sql".into(),
            metadata_path: "/p/.lazy-django/snapshots/1718000000123456789.json".into(),
        };

        let json = serde_json::to_string_pretty(&snap).unwrap();
        assert!(json.contains("\n  \"id\": \"1718000000123456789\""));
        assert!(json.contains("\"applied_migrations\": ["));

        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn null_migrations_read_as_empty() {
        let json = r#"{
  "id": "1",
  "name": "n",
  "timestamp": "2024-06-10T08:30:00Z",
  "git_branch": "",
  "git_commit": "",
  "database_engine": "django.db.backends.sqlite3",
  "applied_migrations": null,
  "file_path": "a",
  "metadata_path": "b"
}"#;
        let parsed: Snapshot = serde_json::from_str(json).unwrap();
        assert!(parsed.applied_migrations.is_empty());
        assert_eq!(parsed.timestamp, Utc.with_ymd_and_hms(2024, 6, 10, 8, 30, 0).unwrap());
    }

    #[test]
    fn engine_family_matches_by_substring() {
        assert_eq!(EngineFamily::from_engine("django.db.backends.postgresql"), EngineFamily::Postgres);
        assert_eq!(EngineFamily::from_engine("django.db.backends.postgresql_psycopg2"), EngineFamily::Postgres);
        assert_eq!(EngineFamily::from_engine("django.db.backends.mysql"), EngineFamily::MySql);
        assert_eq!(EngineFamily::from_engine("django.db.backends.sqlite3"), EngineFamily::Sqlite);
        assert_eq!(EngineFamily::from_engine("django.db.backends.oracle"), EngineFamily::Other);
        assert_eq!(EngineFamily::from_engine(""), EngineFamily::Other);
    }
}
