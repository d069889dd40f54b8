use crate::error::{CurationError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Sorted, deduplicated list of committed sample paths (`meta.info`)
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    path: PathBuf,
    entries: BTreeSet<String>,
}

/// Outcome of one batch's merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManifestUpdate {
    pub before: usize,
    pub after: usize,
    pub added: usize,
}

impl Manifest {
    pub fn parse(path: &Path, text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Load from disk; a missing file is an empty manifest
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Self::parse(path, &text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::parse(path, "")),
            Err(e) => Err(CurationError::Manifest {
                details: format!("reading {}: {}", path.display(), e),
            }),
        }
    }

    pub fn entries(&self) -> &BTreeSet<String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains(entry)
    }

    /// Set union with `new_entries`; returns how many were new
    pub fn merge<I, S>(&mut self, new_entries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.entries.len();
        self.entries.extend(new_entries.into_iter().map(Into::into));
        self.entries.len() - before
    }

    pub fn render(&self) -> String {
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(entry);
            text.push('\n');
        }
        text
    }

    /// Write through a temporary file and rename over the manifest
    pub async fn persist(&self) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "manifest".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let write = async {
            tokio::fs::write(&tmp, self.render()).await?;
            tokio::fs::rename(&tmp, &self.path).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CurationError::Manifest {
                details: format!("writing {}: {}", self.path.display(), e),
            });
        }

        debug!("Manifest {} now has {} entries", self.path.display(), self.len());
        Ok(())
    }

    /// Re-read the manifest, union in `new_entries` and persist
    ///
    /// Re-reading right before the write keeps entries added by anyone else
    /// since this batch started.
    pub async fn merge_into(path: &Path, new_entries: &[String]) -> Result<ManifestUpdate> {
        let mut manifest = Self::load(path).await?;
        let before = manifest.len();
        let added = manifest.merge(new_entries.iter().cloned());
        if added > 0 {
            manifest.persist().await?;
        }
        info!(
            "Manifest {}: {} -> {} entries ({} new)",
            path.display(),
            before,
            manifest.len(),
            added
        );
        Ok(ManifestUpdate {
            before,
            after: manifest.len(),
            added,
        })
    }
}
