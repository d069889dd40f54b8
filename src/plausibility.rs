//! Optional learned gate scoring a whole video for physical plausibility.

use crate::config::PlausibilityConfig;
use crate::error::{CurationError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

pub trait PlausibilityScorer: Send + Sync {
    /// Score in [0, 1]; higher is more plausible
    fn score(&self, video: &Path) -> Result<f64>;
}

/// Runs an external scorer with the video path and parses a float from stdout
pub struct CommandScorer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandScorer {
    pub fn from_config(config: &PlausibilityConfig) -> Result<Self> {
        let program = config.program.as_ref().ok_or_else(|| {
            CurationError::component("plausibility", "No scorer program configured")
        })?;
        Ok(Self {
            program: PathBuf::from(program),
            args: config.args.clone(),
        })
    }
}

impl PlausibilityScorer for CommandScorer {
    fn score(&self, video: &Path) -> Result<f64> {
        let program = self.program.display();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(video)
            .output()
            .map_err(|e| scorer_error(format!("spawning {} failed: {}", program, e)))?;

        if !output.status.success() {
            return Err(scorer_error(format!(
                "{} exited with {:?}",
                program,
                output.status.code()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<f64>().map_err(|e| {
            scorer_error(format!("{} printed invalid score '{}': {}", program, stdout.trim(), e))
        })
    }
}

fn scorer_error(message: String) -> CurationError {
    CurationError::component("plausibility".to_string(), message)
}

/// Scorer returning a constant, for tests and dry runs
#[derive(Debug, Clone, Copy)]
pub struct FixedScorer(pub f64);

impl PlausibilityScorer for FixedScorer {
    fn score(&self, _video: &Path) -> Result<f64> {
        Ok(self.0)
    }
}

/// Gate applying the configured threshold; scorer failures reject
pub struct PlausibilityGate {
    threshold: f64,
    scorer: Box<dyn PlausibilityScorer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlausibilityVerdict {
    pub score: Option<f64>,
    pub passed: bool,
    pub reason: Option<String>,
}

impl PlausibilityGate {
    pub fn new(threshold: f64, scorer: Box<dyn PlausibilityScorer>) -> Self {
        Self { threshold, scorer }
    }

    pub fn evaluate(&self, video: &Path) -> PlausibilityVerdict {
        match self.scorer.score(video) {
            Ok(score) => {
                let passed = score >= self.threshold;
                debug!(
                    "Plausibility of {}: {:.3} (threshold {:.3})",
                    video.display(),
                    score,
                    self.threshold
                );
                PlausibilityVerdict {
                    score: Some(score),
                    passed,
                    reason: (!passed).then(|| {
                        format!(
                            "plausibility score too low: {:.3} < {:.3}",
                            score, self.threshold
                        )
                    }),
                }
            }
            Err(e) => {
                warn!("Plausibility scoring failed for {}: {}", video.display(), e);
                PlausibilityVerdict {
                    score: None,
                    passed: false,
                    reason: Some(format!("plausibility scoring failed: {}", e)),
                }
            }
        }
    }
}
