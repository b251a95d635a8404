//! Persisted record of completed lifecycle stages.
//!
//! Each stage can run as a separate process, so the stages completed for a
//! build folder are stored next to it in `keel-stages.json`. A record only
//! counts for the manifest and settings it was written for; any change to
//! either produces a different fingerprint and invalidates it.

use crate::lifecycle::Stage;
use crate::manifest::Manifest;
use crate::settings::Settings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stage record filename, stored in the build folder.
pub const STAGE_RECORD_FILE: &str = "keel-stages.json";

/// Errors that can occur when reading or writing the stage record.
#[derive(Error, Debug)]
pub enum StageRecordError {
    #[error("cannot access stage record {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid stage record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stages completed for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub fingerprint: String,
    pub completed: Vec<Stage>,
    pub updated_at: DateTime<Utc>,
}

/// Hash of the manifest and the settings it consumes.
pub fn fingerprint(manifest: &Manifest, settings: &Settings) -> Result<String, StageRecordError> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(manifest)?);
    for (key, value) in settings.pairs(&manifest.package.settings) {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

impl StageRecord {
    #[must_use]
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            completed: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn path(build_folder: &Path) -> PathBuf {
        build_folder.join(STAGE_RECORD_FILE)
    }

    /// Load the record of a build folder, if one exists.
    pub fn load(build_folder: &Path) -> Result<Option<Self>, StageRecordError> {
        let path = Self::path(build_folder);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StageRecordError::Io { path, source }),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Load the record only if it belongs to `fingerprint`.
    pub fn load_current(
        build_folder: &Path,
        fingerprint: &str,
    ) -> Result<Option<Self>, StageRecordError> {
        Ok(Self::load(build_folder)?.filter(|record| {
            let current = record.fingerprint == fingerprint;
            if !current {
                tracing::warn!(
                    build_folder = %build_folder.display(),
                    "stage record is stale, manifest or settings changed"
                );
            }
            current
        }))
    }

    pub fn save(&self, build_folder: &Path) -> Result<(), StageRecordError> {
        let path = Self::path(build_folder);
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(&path, content).map_err(|source| StageRecordError::Io { path, source })
    }

    /// Delete the record of a build folder, if there is one.
    pub fn discard(build_folder: &Path) -> Result<(), StageRecordError> {
        let path = Self::path(build_folder);
        if !path.is_file() {
            return Ok(());
        }
        std::fs::remove_file(&path).map_err(|source| StageRecordError::Io { path, source })
    }

    /// Record `stage` as completed, forgetting any later stage.
    pub fn mark(&mut self, stage: Stage) {
        self.completed.retain(|s| *s < stage);
        self.completed.push(stage);
        self.updated_at = Utc::now();
    }

    #[must_use]
    pub fn has(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }
}
