use crate::{error::VcfCleanError, utils::util::Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::types::{BatchArtifact, BatchSummary};

const LAST_BATCH_MARKER: &str = "last-batch-marker";

/// Where finished batch artifacts wait until the sequencer writes them.
#[derive(Debug)]
pub enum ArtifactStore {
    InMemory,
    /// Artifacts as `batch-N-artifact` files, each completed by a
    /// `batch-N-marker` holding its counters.
    Scratch { dir: PathBuf },
}

/// Handle for a stashed artifact, passed from worker to sequencer.
#[derive(Debug)]
pub enum StoredArtifact {
    InMemory(BatchArtifact),
    OnDisk { number: u64 },
}

impl StoredArtifact {
    pub fn number(&self) -> u64 {
        match self {
            StoredArtifact::InMemory(artifact) => artifact.number,
            StoredArtifact::OnDisk { number } => *number,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactMarker {
    number: u64,
    records: u64,
    summary: BatchSummary,
}

impl ArtifactStore {
    /// Creates the scratch directory; it must not exist yet.
    pub fn scratch(dir: &Path) -> Result<Self> {
        if dir.exists() {
            return Err(VcfCleanError::ScratchDirExists {
                path: dir.to_path_buf(),
            });
        }
        fs::create_dir(dir).map_err(|e| {
            crate::vcfclean_error!("Failed to create scratch directory {}: {e}", dir.display())
        })?;
        log::debug!("Batch artifacts go to {}", dir.display());
        Ok(ArtifactStore::Scratch {
            dir: dir.to_path_buf(),
        })
    }

    fn artifact_path(dir: &Path, number: u64) -> PathBuf {
        dir.join(format!("batch-{number}-artifact"))
    }

    fn marker_path(dir: &Path, number: u64) -> PathBuf {
        dir.join(format!("batch-{number}-marker"))
    }

    pub fn stash(&self, artifact: BatchArtifact) -> Result<StoredArtifact> {
        match self {
            ArtifactStore::InMemory => Ok(StoredArtifact::InMemory(artifact)),
            ArtifactStore::Scratch { dir } => {
                let number = artifact.number;
                fs::write(Self::artifact_path(dir, number), artifact.text.as_bytes())?;
                let marker = ArtifactMarker {
                    number,
                    records: artifact.records,
                    summary: artifact.summary,
                };
                fs::write(
                    Self::marker_path(dir, number),
                    serde_json::to_vec(&marker)?,
                )?;
                Ok(StoredArtifact::OnDisk { number })
            }
        }
    }

    /// Hands the artifact back and frees its storage.
    pub fn release(&self, stored: StoredArtifact) -> Result<BatchArtifact> {
        match (self, stored) {
            (_, StoredArtifact::InMemory(artifact)) => Ok(artifact),
            (ArtifactStore::Scratch { dir }, StoredArtifact::OnDisk { number }) => {
                let marker_path = Self::marker_path(dir, number);
                let artifact_path = Self::artifact_path(dir, number);
                let marker: ArtifactMarker = serde_json::from_slice(&fs::read(&marker_path)?)?;
                if marker.number != number {
                    return Err(crate::vcfclean_error!(
                        "Marker {} belongs to batch {}",
                        marker_path.display(),
                        marker.number
                    ));
                }
                let text = fs::read_to_string(&artifact_path)?;
                fs::remove_file(&artifact_path)?;
                fs::remove_file(&marker_path)?;
                Ok(BatchArtifact {
                    number,
                    text,
                    records: marker.records,
                    summary: marker.summary,
                })
            }
            (ArtifactStore::InMemory, StoredArtifact::OnDisk { number }) => Err(
                crate::vcfclean_error!("Batch {number} was stored on disk without a scratch directory"),
            ),
        }
    }

    pub fn record_last_batch(&self, last: Option<u64>) -> Result<()> {
        if let ArtifactStore::Scratch { dir } = self {
            let content = last.map_or_else(|| "none".to_string(), |n| n.to_string());
            fs::write(dir.join(LAST_BATCH_MARKER), content)?;
        }
        Ok(())
    }

    /// Removes the scratch directory after a clean run.
    pub fn finish(&self) -> Result<()> {
        if let ArtifactStore::Scratch { dir } = self {
            let last_marker = dir.join(LAST_BATCH_MARKER);
            if last_marker.exists() {
                fs::remove_file(&last_marker)?;
            }
            fs::remove_dir(dir).map_err(|e| {
                crate::vcfclean_error!(
                    "Failed to remove scratch directory {}: {e}",
                    dir.display()
                )
            })?;
        }
        Ok(())
    }
}
