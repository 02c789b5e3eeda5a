use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::lazydjango::Snapshot;
use crate::error::SnapshotError;
use crate::utils::io::{files_with_extension, remove_if_exists, write_atomic};

/// Payload suffix for the universal exporter. Its output is JSON too, so it
/// gets its own infix to stay clear of the `<id>.json` metadata file.
pub const DATA_JSON_SUFFIX: &str = ".data.json";

/// Layout of one project's snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn open(dir: PathBuf) -> Result<Self, SnapshotError> {
        fs::create_dir_all(&dir).map_err(|source| SnapshotError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// `<id>.sqlite3`, `<id>.sql`, or `<id>.data.json` for `.json` payloads.
    pub fn payload_path(&self, id: &str, extension: &str) -> PathBuf {
        if extension == ".json" {
            self.dir.join(format!("{}{}", id, DATA_JSON_SUFFIX))
        } else {
            self.dir.join(format!("{}{}", id, extension))
        }
    }

    pub fn exists(&self, id: &str) -> bool {
        self.metadata_path(id).exists()
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let content = serde_json::to_string_pretty(snapshot)?;
        let path = PathBuf::from(&snapshot.metadata_path);
        write_atomic(&path, content.as_bytes())
            .map_err(|source| SnapshotError::Persist { path, source })
    }

    pub fn load(&self, id: &str) -> Result<Snapshot, SnapshotError> {
        let content = fs::read_to_string(self.metadata_path(id)).map_err(|source| {
            SnapshotError::NotFound {
                id: id.to_string(),
                source,
            }
        })?;
        serde_json::from_str(&content).map_err(|source| SnapshotError::InvalidMetadata {
            id: id.to_string(),
            source,
        })
    }

    /// Every snapshot with a readable metadata file, in directory order.
    /// Unreadable or corrupt entries are skipped.
    pub fn load_all(&self) -> Result<Vec<Snapshot>, SnapshotError> {
        let files = files_with_extension(&self.dir, "json").map_err(|source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut out = Vec::new();
        for file in files {
            let Some(id) = metadata_id(&file) else {
                continue;
            };
            match self.load(id) {
                Ok(snapshot) => out.push(snapshot),
                Err(err) => warn!(id, error = %err, "skipping unreadable snapshot metadata"),
            }
        }
        Ok(out)
    }

    /// Remove payload, then metadata. Not transactional: if the second removal
    /// fails the payload is already gone and the metadata is left behind.
    pub fn remove(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        for path in [&snapshot.file_path, &snapshot.metadata_path] {
            let path = PathBuf::from(path);
            remove_if_exists(&path).map_err(|source| SnapshotError::Io { path, source })?;
        }
        Ok(())
    }
}

/// ID of a metadata file: `<digits>.json`. Anything else (payloads included)
/// is not metadata.
fn metadata_id(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    (!stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit())).then_some(stem)
}
