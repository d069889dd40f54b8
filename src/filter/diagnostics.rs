//! Advisory records for each filtered candidate: a JSON side-car and an
//! append-only text log of rejections. Nothing reads them back.

use super::FilterVerdict;
use crate::error::Result;
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// `<stem>.verdict.json` next to the video, or inside `diagnostics_dir`
pub fn side_car_path(video: &Path, diagnostics_dir: Option<&Path>) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "candidate".to_string());
    let dir = diagnostics_dir
        .map(Path::to_path_buf)
        .or_else(|| video.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}.verdict.json", stem))
}

pub async fn write_side_car(verdict: &FilterVerdict, diagnostics_dir: Option<&Path>) -> Result<PathBuf> {
    let path = side_car_path(&verdict.video_path, diagnostics_dir);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_vec_pretty(verdict)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

/// Render one failure-log block, terminated by a blank line
pub fn failure_record(verdict: &FilterVerdict) -> String {
    let name = verdict
        .video_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!(
        "video: {}\ntime: {}\nreasons: {}\nscores: {}\n\n",
        name,
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        verdict.reasons.join(", "),
        verdict.score_summary()
    )
}

/// Append a rejection to `<video dir>/<log_name>`
pub async fn append_failure(verdict: &FilterVerdict, log_name: &str) -> Result<PathBuf> {
    let dir = verdict
        .video_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let path = dir.join(log_name);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(failure_record(verdict).as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}
