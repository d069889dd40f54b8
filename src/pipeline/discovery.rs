use crate::error::{CurationError, Result};
use std::path::{Path, PathBuf};

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

/// Candidate videos under `dir`, recursively, sorted by path
pub async fn discover_candidates(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Err(CurationError::CandidateDirMissing(dir.to_path_buf()));
    }

    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && has_extension(&path, extensions) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_recursive_sorted_discovery() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("batch_2");
        std::fs::create_dir_all(&nested).unwrap();
        for path in [
            temp.path().join("b.mp4"),
            temp.path().join("a.MP4"),
            temp.path().join("notes.txt"),
            temp.path().join("a.verdict.json"),
            nested.join("c.mp4"),
        ] {
            std::fs::write(path, b"").unwrap();
        }

        let found = discover_candidates(temp.path(), &["mp4".to_string()])
            .await
            .unwrap();
        assert_eq!(
            found,
            vec![
                temp.path().join("a.MP4"),
                temp.path().join("b.mp4"),
                nested.join("c.mp4"),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_fatal() {
        let err = discover_candidates(Path::new("/no/such/candidates"), &["mp4".to_string()])
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
