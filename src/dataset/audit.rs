use super::allocator::parse_sample_name;
use super::indexer::{DatasetIndexer, STAGING_PREFIX};
use super::manifest::Manifest;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// Consistency report over `gen_datas` and the manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub samples: usize,
    pub manifest_entries: usize,
    /// Samples whose frame directory does not hold exactly the target length
    pub wrong_length: Vec<(String, usize)>,
    /// Manifest entries without a sample directory
    pub missing_directories: Vec<String>,
    /// Sample directories not listed in the manifest
    pub unlisted_samples: Vec<String>,
    pub stale_staging: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.wrong_length.is_empty()
            && self.missing_directories.is_empty()
            && self.unlisted_samples.is_empty()
            && self.stale_staging.is_empty()
    }
}

impl DatasetIndexer {
    pub async fn audit(&self) -> Result<AuditReport> {
        let manifest = Manifest::load(&self.manifest_path()).await?;
        let frames_dir_name = self.config().frames_dir.clone();

        let mut report = AuditReport {
            manifest_entries: manifest.len(),
            ..Default::default()
        };
        let mut sample_names = BTreeSet::new();

        let mut entries = tokio::fs::read_dir(self.gen_datas()).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(STAGING_PREFIX) {
                report.stale_staging.push(name);
                continue;
            }
            if parse_sample_name(&name).is_none() {
                continue;
            }

            let frames_dir = entry.path().join(&frames_dir_name);
            let mut count = 0usize;
            if let Ok(mut frames) = tokio::fs::read_dir(&frames_dir).await {
                while let Some(frame) = frames.next_entry().await? {
                    if frame.file_type().await?.is_file() {
                        count += 1;
                    }
                }
            }
            if count != self.target_length() {
                report.wrong_length.push((name.clone(), count));
            }
            if !manifest.contains(&self.manifest_entry(&name)) {
                report.unlisted_samples.push(name.clone());
            }
            sample_names.insert(name);
        }

        for entry in manifest.entries() {
            let name = entry.rsplit('/').next().unwrap_or(entry);
            if !sample_names.contains(name) {
                report.missing_directories.push(entry.clone());
            }
        }

        report.samples = sample_names.len();
        report.wrong_length.sort();
        report.unlisted_samples.sort();
        report.stale_staging.sort();

        info!(
            "Audit: {} sample(s), {} manifest entr(ies), clean: {}",
            report.samples,
            report.manifest_entries,
            report.is_clean()
        );
        Ok(report)
    }
}
