use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Split `{object}_{viewpoint}_{index}` into prefix and index
///
/// The index is at least three digits; wider indices appear once a prefix
/// passes 999.
pub fn parse_sample_name(name: &str) -> Option<(&str, u32)> {
    let (prefix, digits) = name.rsplit_once('_')?;
    if prefix.is_empty() || digits.len() < 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((prefix, digits.parse().ok()?))
}

pub fn sample_prefix(object: &str, viewpoint: &str) -> String {
    format!("{}_{}", object, viewpoint)
}

pub fn sample_name(prefix: &str, index: u32) -> String {
    format!("{}_{:03}", prefix, index)
}

/// Hands out sample directory names, serialized behind one lock
///
/// `gen_datas` is scanned once when the allocator is built; later allocations
/// continue from the highest index seen per prefix.
#[derive(Debug)]
pub struct IndexAllocator {
    root: PathBuf,
    highest: Mutex<HashMap<String, u32>>,
}

impl IndexAllocator {
    pub fn scan(root: &Path) -> Result<Self> {
        let mut highest: HashMap<String, u32> = HashMap::new();
        if root.exists() {
            for entry in std::fs::read_dir(root)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some((prefix, index)) = parse_sample_name(&name) {
                    let slot = highest.entry(prefix.to_string()).or_insert(0);
                    *slot = (*slot).max(index);
                }
            }
        }
        debug!(
            "Index scan of {} found {} prefix(es)",
            root.display(),
            highest.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            highest: Mutex::new(highest),
        })
    }

    /// Highest committed index for a prefix, as of the scan plus allocations
    pub fn highest(&self, prefix: &str) -> Option<u32> {
        self.highest.lock().get(prefix).copied()
    }

    /// Next free name for `(object, viewpoint)`; never reuses an index
    pub fn allocate(&self, object: &str, viewpoint: &str) -> String {
        let prefix = sample_prefix(object, viewpoint);
        let mut highest = self.highest.lock();
        let slot = highest.entry(prefix.clone()).or_insert(0);
        loop {
            *slot += 1;
            let name = sample_name(&prefix, *slot);
            // Directories created behind our back since the scan
            if !self.root.join(&name).exists() {
                return name;
            }
        }
    }
}
