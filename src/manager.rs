use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::config::lazydjango::{EngineFamily, Snapshot};
use crate::drivers::selector::{select_for_create, select_for_restore};
use crate::drivers::{DriverContext, EnvLookup, SnapshotDriver, Strategy};
use crate::error::SnapshotError;
use crate::project::CommandExecutor;
use crate::storage::SnapshotStore;
use crate::utils::git;

/// Create, list, restore and delete snapshots of one project's database.
///
/// Metadata files are the record of what exists; a payload without metadata
/// is ignored. Assumes at most one mutating call per project at a time.
pub struct SnapshotManager {
    executor: CommandExecutor,
    store: SnapshotStore,
    env: Box<EnvLookup>,
    last_id: i64,
}

impl SnapshotManager {
    /// Opens (and creates) the project's snapshot directory.
    pub fn new(executor: CommandExecutor) -> Result<Self, SnapshotError> {
        let dir = executor
            .tools()
            .snapshots_dir_in(&executor.project().root_dir);
        let store = SnapshotStore::open(dir)?;
        Ok(Self {
            executor,
            store,
            env: Box::new(|key: &str| std::env::var(key).ok()),
            last_id: 0,
        })
    }

    /// Replace the environment lookup used for database passwords.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(env);
        self
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut CommandExecutor {
        &mut self.executor
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Strategy a new snapshot would use right now.
    pub fn create_strategy(&self) -> Strategy {
        let project = self.executor.project();
        let tools = self.executor.tools();
        let runner = self.executor.runner();
        select_for_create(&project.database.engine, project.has_docker, |family| match family {
            EngineFamily::Postgres => runner.has_command(&tools.postgres.dump),
            EngineFamily::MySql => runner.has_command(&tools.mysql.dump),
            _ => false,
        })
    }

    pub fn create_snapshot(&mut self, name: Option<&str>) -> Result<Snapshot, SnapshotError> {
        let id = self.next_id();
        let timestamp = Utc.timestamp_nanos(id);
        let id = id.to_string();
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => default_name(timestamp),
        };

        let (git_branch, git_commit) = git::head_info(
            self.executor.runner().as_ref(),
            &self.executor.project().root_dir,
        );
        let applied_migrations = self.applied_migrations();

        let strategy = self.create_strategy();
        let file_path = self.store.payload_path(&id, strategy.extension());
        let metadata_path = self.store.metadata_path(&id);
        let snapshot = Snapshot {
            id,
            name,
            timestamp,
            git_branch,
            git_commit,
            database_engine: self.executor.project().database.engine.clone(),
            applied_migrations,
            file_path: file_path.display().to_string(),
            metadata_path: metadata_path.display().to_string(),
        };

        info!(id = %snapshot.id, strategy = strategy.name(), "creating snapshot");
        let mut cx = DriverContext {
            executor: &mut self.executor,
            env: self.env.as_ref(),
        };
        strategy
            .dump(&mut cx, &file_path)
            .map_err(|source| SnapshotError::Dump { source })?;

        self.store.save(&snapshot)?;
        Ok(snapshot)
    }

    /// All readable snapshots, newest first.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let mut snapshots = self.store.load_all()?;
        snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(snapshots)
    }

    pub fn get_snapshot(&self, id: &str) -> Result<Snapshot, SnapshotError> {
        self.store.load(id)
    }

    pub fn latest_snapshot(&self) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.list_snapshots()?.into_iter().next())
    }

    /// Restore the payload, then mark the snapshot's migrations as applied.
    /// Only a payload failure is an error.
    pub fn restore_snapshot(&mut self, id: &str) -> Result<Snapshot, SnapshotError> {
        let snapshot = self.store.load(id)?;
        let strategy = select_for_restore(&snapshot);
        info!(id, strategy = strategy.name(), "restoring snapshot");

        let mut cx = DriverContext {
            executor: &mut self.executor,
            env: self.env.as_ref(),
        };
        strategy
            .restore(&mut cx, std::path::Path::new(&snapshot.file_path))
            .map_err(|source| SnapshotError::Restore { source })?;

        self.sync_migrations(&snapshot);
        Ok(snapshot)
    }

    /// Remove payload and metadata. A second delete of the same ID is NotFound.
    pub fn delete_snapshot(&mut self, id: &str) -> Result<Snapshot, SnapshotError> {
        let snapshot = self.store.load(id)?;
        self.store.remove(&snapshot)?;
        info!(id, "deleted snapshot");
        Ok(snapshot)
    }

    /// Nanosecond timestamp, bumped past the last ID issued here and past any
    /// metadata already on disk.
    fn next_id(&mut self) -> i64 {
        let now = Utc::now();
        let mut id = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000));
        if id <= self.last_id {
            id = self.last_id + 1;
        }
        while self.store.exists(&id.to_string()) {
            id += 1;
        }
        self.last_id = id;
        id
    }

    fn applied_migrations(&mut self) -> Vec<String> {
        match self.executor.run(&["showmigrations", "--plan"]) {
            Ok(output) => parse_applied_migrations(&output),
            Err(err) => {
                warn!(error = %err, "could not list applied migrations");
                Vec::new()
            }
        }
    }

    fn sync_migrations(&mut self, snapshot: &Snapshot) {
        debug!(count = snapshot.applied_migrations.len(), "syncing migration state");
        if let Err(err) = self.executor.run(&["migrate", "--fake"]) {
            warn!(error = %err, "migration sync after restore failed");
        }
    }
}

fn default_name(timestamp: DateTime<Utc>) -> String {
    format!("snapshot-{}", timestamp.format("%Y%m%d-%H%M%S"))
}

/// Entries marked `[X]` in `showmigrations --plan` output.
pub fn parse_applied_migrations(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("[X]"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}
