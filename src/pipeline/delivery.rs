//! Delivery of enriched listings to downstream consumers

use crate::pipeline::listing::EnrichedListing;
use crate::state::TaskType;
use crate::RelayError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Sink for the enriched set of one run
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, task: TaskType, listings: &[EnrichedListing]) -> crate::Result<()>;
}

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    task_type: &'a str,
    generated_at: DateTime<Utc>,
    count: usize,
    fallback_count: usize,
    listings: &'a [EnrichedListing],
}

/// Writes one pretty-printed JSON snapshot per run
///
/// Files are named `<task>-<YYYYmmdd-HHMMSS-mmm>.json` inside the delivery
/// directory, which is created on first use. An existing file is never
/// replaced; a clashing name gets a `-<n>` suffix.
#[derive(Debug, Clone)]
pub struct JsonFileDelivery {
    dir: PathBuf,
}

impl JsonFileDelivery {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, task: TaskType, at: DateTime<Utc>, attempt: u32) -> PathBuf {
        let stamp = at.format("%Y%m%d-%H%M%S-%3f");
        if attempt == 0 {
            self.dir.join(format!("{}-{}.json", task, stamp))
        } else {
            self.dir.join(format!("{}-{}-{}.json", task, stamp, attempt))
        }
    }

    /// Writes `bytes` to the first free snapshot name
    async fn write_new(&self, task: TaskType, at: DateTime<Utc>, bytes: &[u8]) -> crate::Result<PathBuf> {
        let mut attempt = 0;
        loop {
            let path = self.snapshot_path(task, at, attempt);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match opened {
                Ok(mut file) => {
                    file.write_all(bytes)
                        .await
                        .map_err(|e| RelayError::Delivery(format!("{}: {}", path.display(), e)))?;
                    file.flush()
                        .await
                        .map_err(|e| RelayError::Delivery(format!("{}: {}", path.display(), e)))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(RelayError::Delivery(format!("{}: {}", path.display(), e))),
            }
        }
    }
}

#[async_trait]
impl Delivery for JsonFileDelivery {
    async fn deliver(&self, task: TaskType, listings: &[EnrichedListing]) -> crate::Result<()> {
        let generated_at = Utc::now();
        let snapshot = Snapshot {
            task_type: task.as_str(),
            generated_at,
            count: listings.len(),
            fallback_count: listings.iter().filter(|l| l.is_fallback()).count(),
            listings,
        };

        let json = serde_json::to_vec_pretty(&snapshot)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RelayError::Delivery(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.write_new(task, generated_at, &json).await?;

        tracing::info!("Delivered {} {} listings to {}", listings.len(), task, path.display());
        Ok(())
    }
}
