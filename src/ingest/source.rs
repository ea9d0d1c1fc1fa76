//! Mail document sources.
//!
//! A [`MailSource`] hands the pipeline raw email documents by name and
//! moves them out of the way once processed. The shipped implementation
//! is a local drop directory; the trait keeps the pipeline testable and
//! leaves room for an object-store source behind the same interface.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::ingest::email::ClaimEmail;

/// Where inbound claim emails come from.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Source label for logs and the processing trail.
    fn name(&self) -> &str;

    /// Names of documents currently waiting, in a stable order.
    async fn list(&self) -> Result<Vec<String>, SourceError>;

    /// Fetch and parse one document.
    async fn fetch(&self, name: &str) -> Result<ClaimEmail, SourceError>;

    /// Move a processed document into the archive.
    async fn archive(&self, name: &str) -> Result<(), SourceError>;
}

/// Drop-directory source: `.json` mailbox exports and raw `.eml` files.
///
/// Archived documents are renamed to `archived_YYYYMMDD_<name>` in the
/// archive directory, matching the naming the downstream audit tooling
/// expects.
pub struct DirSource {
    drop_dir: PathBuf,
    archive_dir: PathBuf,
}

impl DirSource {
    /// Create a source over the given directories, creating them if needed.
    pub fn new(drop_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let drop_dir = drop_dir.into();
        let archive_dir = archive_dir.into();
        std::fs::create_dir_all(&drop_dir)?;
        std::fs::create_dir_all(&archive_dir)?;
        Ok(Self {
            drop_dir,
            archive_dir,
        })
    }

    pub fn drop_dir(&self) -> &Path {
        &self.drop_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Delete archived documents older than `keep_days`. Returns the number
    /// removed. Files with unreadable metadata are skipped.
    pub fn prune_archive(&self, keep_days: u32) -> Result<usize, SourceError> {
        let cutoff = SystemTime::now() - Duration::from_secs(u64::from(keep_days) * 86_400);
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.archive_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping archive entry without mtime");
                    continue;
                }
            };
            if modified < cutoff {
                std::fs::remove_file(&path)?;
                debug!(path = %path.display(), "Pruned archived document");
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, keep_days, "Archive pruned");
        }
        Ok(removed)
    }
}

#[async_trait]
impl MailSource for DirSource {
    fn name(&self) -> &str {
        "dir"
    }

    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&self.drop_dir).map_err(|e| SourceError::List {
            source_name: self.drop_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_mail_document(&name) {
                names.push(name);
            }
        }
        // Stable order so runs are reproducible.
        names.sort();
        Ok(names)
    }

    async fn fetch(&self, name: &str) -> Result<ClaimEmail, SourceError> {
        let path = self.drop_dir.join(name);
        let raw = std::fs::read(&path).map_err(|e| SourceError::Fetch {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        if name.to_lowercase().ends_with(".eml") {
            ClaimEmail::from_rfc822(name, &raw)
        } else {
            ClaimEmail::from_json(name, &raw)
        }
    }

    async fn archive(&self, name: &str) -> Result<(), SourceError> {
        let from = self.drop_dir.join(name);
        let stamped = format!("archived_{}_{name}", Utc::now().format("%Y%m%d"));
        let to = self.archive_dir.join(stamped);
        std::fs::rename(&from, &to).map_err(|e| SourceError::Archive {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        debug!(name, to = %to.display(), "Document archived");
        Ok(())
    }
}

fn is_mail_document(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered.ends_with(".json") || lowered.ends_with(".eml")
}
