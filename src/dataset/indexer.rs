use super::allocator::IndexAllocator;
use super::intrinsics::CameraIntrinsics;
use super::manifest::{Manifest, ManifestUpdate};
use crate::config::DatasetConfig;
use crate::error::{CurationError, Result};
use crate::frame::FrameNaming;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Prefix of in-progress directories inside `gen_datas`
pub const STAGING_PREFIX: &str = ".staging-";

/// A committed sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleHandle {
    pub name: String,
    pub path: PathBuf,
    /// Line recorded in the manifest for this sample
    pub manifest_entry: String,
    pub frame_count: usize,
    pub aux_copied: Vec<String>,
    pub aux_missing: Vec<String>,
}

/// Owns the `gen_datas` tree and the manifest of one dataset root
#[derive(Debug)]
pub struct DatasetIndexer {
    config: DatasetConfig,
    dataset_root: PathBuf,
    gen_datas: PathBuf,
    naming: FrameNaming,
    target_length: usize,
    allocator: IndexAllocator,
}

impl DatasetIndexer {
    /// Prepare the directory layout and scan existing sample indices
    pub async fn open(
        dataset_root: &Path,
        config: DatasetConfig,
        naming: FrameNaming,
        target_length: usize,
    ) -> Result<Self> {
        let gen_datas = dataset_root.join(&config.gen_datas_dir);
        tokio::fs::create_dir_all(&gen_datas).await?;
        tokio::fs::create_dir_all(dataset_root.join(&config.models_dir)).await?;

        let allocator = IndexAllocator::scan(&gen_datas)?;
        info!("Dataset indexer ready at {}", dataset_root.display());

        Ok(Self {
            config,
            dataset_root: dataset_root.to_path_buf(),
            gen_datas,
            naming,
            target_length,
            allocator,
        })
    }

    pub fn dataset_root(&self) -> &Path {
        &self.dataset_root
    }

    pub fn gen_datas(&self) -> &Path {
        &self.gen_datas
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dataset_root.join(&self.config.manifest_name)
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// Manifest line for a sample: `<root dir name>/<gen_datas>/<name>`
    pub fn manifest_entry(&self, name: &str) -> String {
        let root_name = self
            .dataset_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string());
        format!("{}/{}/{}", root_name, self.config.gen_datas_dir, name)
    }

    /// Fresh scratch directory inside `gen_datas`, removed by [`Self::recover`]
    /// if a run dies before cleaning it up
    pub async fn scratch_dir(&self, label: &str) -> Result<PathBuf> {
        let dir = self
            .gen_datas
            .join(format!("{}{}-{}", STAGING_PREFIX, label, uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Commit one normalized sequence plus auxiliary capture files
    ///
    /// Everything is assembled in a staging directory and renamed into place,
    /// so the sample either exists complete or not at all.
    pub async fn commit(
        &self,
        object: &str,
        viewpoint: &str,
        frame_source_dir: &Path,
        capture_dir: &Path,
    ) -> Result<SampleHandle> {
        let name = self.allocator.allocate(object, viewpoint);
        let staging = self
            .gen_datas
            .join(format!("{}{}-{}", STAGING_PREFIX, name, uuid::Uuid::new_v4()));
        let target = self.gen_datas.join(&name);

        debug!("Committing {} via {}", name, staging.display());
        match self
            .assemble(&name, object, &staging, frame_source_dir, capture_dir)
            .await
        {
            Ok((frame_count, aux_copied, aux_missing)) => {
                if let Err(e) = tokio::fs::rename(&staging, &target).await {
                    remove_dir_quietly(&staging).await;
                    return Err(CurationError::commit(
                        name,
                        format!("moving sample into place: {}", e),
                    ));
                }
                info!(
                    "Committed sample {} ({} frames, {} aux file(s))",
                    name,
                    frame_count,
                    aux_copied.len()
                );
                Ok(SampleHandle {
                    manifest_entry: self.manifest_entry(&name),
                    name,
                    path: target,
                    frame_count,
                    aux_copied,
                    aux_missing,
                })
            }
            Err(e) => {
                error!("Commit of {} failed, rolling back: {}", name, e);
                remove_dir_quietly(&staging).await;
                match e {
                    CurationError::Commit { .. }
                    | CurationError::FrameCountMismatch { .. }
                    | CurationError::Intrinsics { .. } => Err(e),
                    other => Err(CurationError::commit(name, other.to_string())),
                }
            }
        }
    }

    async fn assemble(
        &self,
        name: &str,
        object: &str,
        staging: &Path,
        frame_source_dir: &Path,
        capture_dir: &Path,
    ) -> Result<(usize, Vec<String>, Vec<String>)> {
        let frames_dir = staging.join(&self.config.frames_dir);
        tokio::fs::create_dir_all(&frames_dir).await?;

        let frame_count = self.copy_frames(frame_source_dir, &frames_dir).await?;

        let mut aux_copied = Vec::new();
        let mut aux_missing = Vec::new();
        for file in &self.config.aux_files {
            let source = capture_dir.join(file);
            if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
                warn!(
                    "Auxiliary file {} missing for {}, continuing without it",
                    source.display(),
                    name
                );
                aux_missing.push(file.clone());
                continue;
            }

            if *file == self.config.intrinsics_file {
                let text = tokio::fs::read_to_string(&source).await?;
                CameraIntrinsics::parse(&text)?;
            }

            tokio::fs::copy(&source, staging.join(file))
                .await
                .map_err(|e| {
                    CurationError::commit(name.to_string(), format!("copying {}: {}", file, e))
                })?;
            aux_copied.push(file.clone());
        }

        let cad_reference = self
            .dataset_root
            .join(&self.config.models_dir)
            .join(object);
        tokio::fs::write(
            staging.join(&self.config.cad_info_name),
            cad_reference.to_string_lossy().as_bytes(),
        )
        .await?;

        Ok((frame_count, aux_copied, aux_missing))
    }

    /// Copy exactly the expected frame names; anything else is a mismatch
    async fn copy_frames(&self, source: &Path, dest: &Path) -> Result<usize> {
        let mut found = 0usize;
        let mut entries = tokio::fs::read_dir(source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            match self.naming.parse(&name) {
                Some(index) if index < self.target_length => found += 1,
                _ => {
                    return Err(CurationError::FrameCountMismatch {
                        dir: source.to_path_buf(),
                        expected: self.target_length,
                        found: found + 1,
                    })
                }
            }
        }
        if found != self.target_length {
            return Err(CurationError::FrameCountMismatch {
                dir: source.to_path_buf(),
                expected: self.target_length,
                found,
            });
        }

        for index in 0..self.target_length {
            let file = self.naming.file_name(index);
            tokio::fs::copy(source.join(&file), dest.join(&file)).await?;
        }
        Ok(self.target_length)
    }

    /// Merge committed entries into the manifest; call once per batch
    pub async fn merge_manifest(&self, entries: &[String]) -> Result<ManifestUpdate> {
        Manifest::merge_into(&self.manifest_path(), entries).await
    }

    /// Remove staging directories left by an interrupted run
    pub async fn recover(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.gen_datas).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(STAGING_PREFIX) && entry.file_type().await?.is_dir() {
                warn!("Removing stale staging directory {}", name);
                tokio::fs::remove_dir_all(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

pub(crate) async fn remove_dir_quietly(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}
