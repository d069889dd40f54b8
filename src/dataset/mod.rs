//! Sample directory allocation, transactional commit and the dataset manifest.

mod allocator;
mod audit;
mod indexer;
mod intrinsics;
mod manifest;

pub use allocator::{parse_sample_name, sample_name, sample_prefix, IndexAllocator};
pub use audit::AuditReport;
pub use indexer::{DatasetIndexer, SampleHandle, STAGING_PREFIX};
pub(crate) use indexer::remove_dir_quietly;
pub use intrinsics::CameraIntrinsics;
pub use manifest::{Manifest, ManifestUpdate};
