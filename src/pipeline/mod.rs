//! Batch orchestration: discover candidates, gate each through the content
//! filter, motion analyzer and optional plausibility scorer, then normalize
//! and commit the survivors.

mod discovery;
mod report;

pub use discovery::discover_candidates;
pub use report::{BatchReport, CandidateOutcome, CandidateStatus};

use crate::analyzer::MotionAnalyzer;
use crate::config::CurationConfig;
use crate::dataset::{remove_dir_quietly, DatasetIndexer};
use crate::detect::{Detector, TargetClass};
use crate::error::Result;
use crate::filter::ContentFilter;
use crate::normalizer::FrameNormalizer;
use crate::plausibility::{CommandScorer, PlausibilityGate, PlausibilityScorer, PlausibilityVerdict};
use crate::video::DecoderChain;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One batch of candidates for a single object and viewpoint
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub object: String,
    pub viewpoint: String,
    pub target_class: Option<TargetClass>,
    pub candidate_dir: PathBuf,
    pub capture_dir: PathBuf,
    /// Run the gates only; nothing is normalized, committed or deleted
    pub dry_run: bool,
}

impl BatchRequest {
    /// Request using the configured candidate and capture directories
    pub fn from_config(config: &CurationConfig, object: &str, viewpoint: &str) -> Self {
        Self {
            object: object.to_string(),
            viewpoint: viewpoint.to_string(),
            target_class: None,
            candidate_dir: PathBuf::from(&config.paths.candidate_dir),
            capture_dir: PathBuf::from(&config.paths.capture_dir),
            dry_run: false,
        }
    }
}

#[derive(Clone)]
pub struct CurationPipeline {
    config: CurationConfig,
    filter: ContentFilter,
    analyzer: MotionAnalyzer,
    normalizer: FrameNormalizer,
    plausibility: Option<Arc<PlausibilityGate>>,
}

impl CurationPipeline {
    pub fn new(config: CurationConfig, decoders: DecoderChain, detector: Arc<dyn Detector>) -> Self {
        let decoder = Arc::new(decoders.clone());
        let filter = ContentFilter::new(
            config.filter.clone(),
            &config.motion,
            decoder.clone(),
            detector,
        )
        .with_diagnostics_dir(config.paths.diagnostics_dir.as_ref().map(PathBuf::from));
        let analyzer = MotionAnalyzer::new(config.motion.clone(), decoder);
        let normalizer = FrameNormalizer::new(config.normalize.clone(), decoders);

        Self {
            config,
            filter,
            analyzer,
            normalizer,
            plausibility: None,
        }
    }

    /// Pipeline over the configured decoder backends and, when enabled, the
    /// configured plausibility scorer
    pub fn from_config(config: CurationConfig, detector: Arc<dyn Detector>) -> Result<Self> {
        let decoders = DecoderChain::from_names(&config.normalize.backends)?;
        let scorer = if config.plausibility.enabled {
            Some(CommandScorer::from_config(&config.plausibility)?)
        } else {
            None
        };

        let pipeline = Self::new(config, decoders, detector);
        Ok(match scorer {
            Some(scorer) => pipeline.with_scorer(Box::new(scorer)),
            None => pipeline,
        })
    }

    /// Add the plausibility gate after the motion analyzer
    pub fn with_scorer(mut self, scorer: Box<dyn PlausibilityScorer>) -> Self {
        self.plausibility = Some(Arc::new(PlausibilityGate::new(
            self.config.plausibility.threshold,
            scorer,
        )));
        self
    }

    pub fn config(&self) -> &CurationConfig {
        &self.config
    }

    /// Open the dataset indexer for a batch (scans existing indices once)
    pub async fn open_indexer(&self) -> Result<DatasetIndexer> {
        DatasetIndexer::open(
            &self.config.dataset_root(),
            self.config.dataset.clone(),
            self.normalizer.naming().clone(),
            self.normalizer.target_length(),
        )
        .await
    }

    /// Process every candidate in the request's directory
    ///
    /// Errors only on batch-fatal conditions; per-candidate failures are
    /// reported in the returned [`BatchReport`].
    pub async fn run_batch(&self, request: &BatchRequest, cancel: CancellationToken) -> Result<BatchReport> {
        let started_at = Utc::now();
        let candidates =
            discover_candidates(&request.candidate_dir, &self.config.paths.extensions).await?;
        info!(
            "Batch {}_{}: {} candidate(s) in {}",
            request.object,
            request.viewpoint,
            candidates.len(),
            request.candidate_dir.display()
        );

        let indexer = Arc::new(self.open_indexer().await?);
        if !request.dry_run {
            let recovered = indexer.recover().await?;
            if recovered > 0 {
                warn!("Removed {} staging director(ies) from an earlier run", recovered);
            }
        }

        let request = Arc::new(request.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.pipeline.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut outcomes: Vec<Option<CandidateOutcome>> = vec![None; candidates.len()];

        for (position, video) in candidates.iter().enumerate() {
            let permit = tokio::select! {
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                info!("Batch cancelled; {} candidate(s) left unprocessed", candidates.len() - position);
                break;
            };

            let pipeline = self.clone();
            let indexer = indexer.clone();
            let request = request.clone();
            let video = video.clone();
            tasks.spawn(async move {
                let outcome = pipeline.process_candidate(&request, &indexer, &video).await;
                drop(permit);
                (position, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, outcome)) => outcomes[position] = Some(outcome),
                Err(e) => error!("Candidate task failed: {}", e),
            }
        }

        let outcomes: Vec<CandidateOutcome> = outcomes
            .into_iter()
            .zip(&candidates)
            .map(|(outcome, video)| {
                outcome.unwrap_or_else(|| {
                    let mut skipped = CandidateOutcome::new(video);
                    if !cancel.is_cancelled() {
                        skipped.status = CandidateStatus::Failed;
                        skipped.reasons.push("processing task aborted".to_string());
                    }
                    skipped
                })
            })
            .collect();

        let mut report = BatchReport::summarize(
            &request.object,
            &request.viewpoint,
            started_at,
            request.dry_run,
            cancel.is_cancelled(),
            outcomes,
        );

        // Single manifest write per batch, after every worker has finished
        let entries: Vec<String> = report
            .outcomes
            .iter()
            .filter_map(|o| o.sample.as_ref())
            .map(|name| indexer.manifest_entry(name))
            .collect();
        if !entries.is_empty() {
            match indexer.merge_manifest(&entries).await {
                Ok(update) => report.manifest = Some(update),
                Err(e) => {
                    error!("Manifest update failed: {}", e);
                    report.all_succeeded = false;
                    report.need_retry = true;
                }
            }
        }

        info!(
            "Batch done: {} total, {} accepted, {} rejected, {} committed, {} failed (retry: {})",
            report.total,
            report.accepted,
            report.rejected,
            report.committed,
            report.failed,
            report.need_retry
        );

        if self.config.pipeline.write_report {
            let reports_dir = self.config.dataset_root().join("reports");
            match report.write_to(&reports_dir).await {
                Ok(path) => info!("Batch report written to {}", path.display()),
                Err(e) => warn!("Failed to write batch report: {}", e),
            }
        }

        Ok(report)
    }

    async fn process_candidate(
        &self,
        request: &BatchRequest,
        indexer: &DatasetIndexer,
        video: &Path,
    ) -> CandidateOutcome {
        let mut outcome = CandidateOutcome::new(video);

        let verdict = self.filter.filter(video, request.target_class.as_ref()).await;
        outcome.hand_ratio = Some(verdict.hand_ratio);
        outcome.object_ratio = Some(verdict.object_ratio);
        outcome.static_ratio = Some(verdict.static_ratio);
        if !verdict.passed {
            return self.reject(outcome, verdict.reasons, request.dry_run).await;
        }

        let motion = self.analyzer.check(video.to_path_buf()).await;
        outcome.motion = Some(motion);
        if !motion.is_static {
            let reason = format!(
                "camera not static: average flow {:.3} >= {:.3}",
                motion.average_magnitude, self.config.motion.threshold
            );
            return self.reject(outcome, vec![reason], request.dry_run).await;
        }

        if let Some(gate) = &self.plausibility {
            let gate = gate.clone();
            let path = video.to_path_buf();
            let plausible = match tokio::task::spawn_blocking(move || gate.evaluate(&path)).await {
                Ok(verdict) => verdict,
                Err(e) => PlausibilityVerdict {
                    score: None,
                    passed: false,
                    reason: Some(format!("plausibility scoring failed: {}", e)),
                },
            };
            outcome.plausibility_score = plausible.score;
            if !plausible.passed {
                let reasons = plausible.reason.into_iter().collect();
                return self.reject(outcome, reasons, request.dry_run).await;
            }
        }

        if request.dry_run {
            info!("Dry run: {} passed every gate", video.display());
            outcome.status = CandidateStatus::Accepted;
            return outcome;
        }

        match self.normalize_and_commit(request, indexer, video).await {
            Ok(sample) => {
                outcome.status = CandidateStatus::Committed;
                outcome.sample = Some(sample);
                if self.config.dataset.remove_source_videos {
                    remove_video(video).await;
                }
            }
            Err(e) => {
                error!("Candidate {} failed: {}", video.display(), e);
                outcome.status = CandidateStatus::Failed;
                outcome.reasons.push(e.to_string());
            }
        }
        outcome
    }

    async fn normalize_and_commit(
        &self,
        request: &BatchRequest,
        indexer: &DatasetIndexer,
        video: &Path,
    ) -> Result<String> {
        let scratch = indexer.scratch_dir("frames").await?;
        let frames_dir = scratch.join(&self.config.dataset.frames_dir);

        let result = async {
            self.normalizer.normalize(video, &frames_dir).await?;
            indexer
                .commit(
                    &request.object,
                    &request.viewpoint,
                    &frames_dir,
                    &request.capture_dir,
                )
                .await
        }
        .await;

        remove_dir_quietly(&scratch).await;
        Ok(result?.name)
    }

    async fn reject(
        &self,
        mut outcome: CandidateOutcome,
        reasons: Vec<String>,
        dry_run: bool,
    ) -> CandidateOutcome {
        info!(
            "Rejected {}: {}",
            outcome.video.display(),
            reasons.join(", ")
        );
        outcome.status = CandidateStatus::Rejected;
        outcome.reasons = reasons;
        if self.config.pipeline.delete_rejected && !dry_run {
            remove_video(&outcome.video).await;
        }
        outcome
    }
}

async fn remove_video(video: &Path) {
    match tokio::fs::remove_file(video).await {
        Ok(()) => info!("Removed source video {}", video.display()),
        Err(e) => warn!("Failed to remove {}: {}", video.display(), e),
    }
}

#[cfg(test)]
mod tests;
