use crate::analyzer::StaticVerdict;
use crate::dataset::ManifestUpdate;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Normalized and committed into the dataset
    Committed,
    /// Passed every gate; nothing written (dry run)
    Accepted,
    /// Turned down by a gate
    Rejected,
    /// Passed the gates but normalization or commit failed
    Failed,
    /// Not processed because the batch was cancelled
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateOutcome {
    pub video: PathBuf,
    pub status: CandidateStatus,
    pub reasons: Vec<String>,
    pub sample: Option<String>,
    pub hand_ratio: Option<f64>,
    pub object_ratio: Option<f64>,
    pub static_ratio: Option<f64>,
    pub motion: Option<StaticVerdict>,
    pub plausibility_score: Option<f64>,
}

impl CandidateOutcome {
    pub fn new(video: &Path) -> Self {
        Self {
            video: video.to_path_buf(),
            status: CandidateStatus::Skipped,
            reasons: Vec::new(),
            sample: None,
            hand_ratio: None,
            object_ratio: None,
            static_ratio: None,
            motion: None,
            plausibility_score: None,
        }
    }

    pub fn passed_gates(&self) -> bool {
        matches!(
            self.status,
            CandidateStatus::Committed | CandidateStatus::Accepted | CandidateStatus::Failed
        )
    }
}

/// Batch summary handed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub object: String,
    pub viewpoint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub cancelled: bool,
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub committed: usize,
    pub failed: usize,
    pub outcomes: Vec<CandidateOutcome>,
    pub manifest: Option<ManifestUpdate>,
    pub all_succeeded: bool,
    pub need_retry: bool,
}

impl BatchReport {
    pub fn summarize(
        object: &str,
        viewpoint: &str,
        started_at: DateTime<Utc>,
        dry_run: bool,
        cancelled: bool,
        outcomes: Vec<CandidateOutcome>,
    ) -> Self {
        let count = |status: CandidateStatus| outcomes.iter().filter(|o| o.status == status).count();
        let total = outcomes.len();
        let accepted = outcomes.iter().filter(|o| o.passed_gates()).count();
        let rejected = count(CandidateStatus::Rejected);
        let committed = count(CandidateStatus::Committed);
        let failed = count(CandidateStatus::Failed);

        let all_succeeded = total > 0 && accepted > 0 && failed == 0 && !cancelled;
        let need_retry = total == 0 || accepted == 0 || failed > 0 || cancelled;

        Self {
            object: object.to_string(),
            viewpoint: viewpoint.to_string(),
            started_at,
            finished_at: Utc::now(),
            dry_run,
            cancelled,
            total,
            accepted,
            rejected,
            committed,
            failed,
            outcomes,
            manifest: None,
            all_succeeded,
            need_retry,
        }
    }

    /// Persist as `<dir>/batch-<timestamp>.json`
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!(
            "batch-{}-{}.json",
            self.started_at.format("%Y%m%dT%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));
        tokio::fs::write(&path, serde_json::to_vec_pretty(self)?).await?;
        Ok(path)
    }
}
