//! Polyp segmentation dataset: `<root>/images` + `<root>/masks` with identical file names.
//!
//! Indexing, deterministic splitting, paired augmentation and Burn batching.

pub mod aug;
pub mod batch;
pub mod index;
pub mod sample;
pub mod split;
pub mod types;

pub use aug::AugmentConfig;
pub use batch::{BatchIter, DatasetProvider, PipelineConfig, SegBatch, SegmentationPipeline};
pub use index::{index_pairs, is_image_file, list_image_names, select_random_images};
pub use sample::{load_pair, read_image, read_mask, ExportImage};
pub use split::{split_pairs, DatasetSplits, Split, SplitManifest};
pub use types::{DatasetError, DatasetResult, LoadedSample, SamplePair};
