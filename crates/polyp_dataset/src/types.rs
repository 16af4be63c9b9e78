//! Error definitions and shared sample types for polyp_dataset.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("the provided path is not valid or is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("mask missing for image {image}: expected {mask}")]
    MissingMask { image: PathBuf, mask: PathBuf },
    #[error("the number of images to select is zero ({available} available at percentage {percentage})")]
    EmptySelection { available: usize, percentage: f64 },
    #[error("percentage must be within 0..=1, got {0}")]
    InvalidPercentage(f64),
    #[error("split ratio must be within 0..0.5, got {0}")]
    InvalidSplit(f64),
    #[error("split manifest lists {0}, which is not in the dataset")]
    ManifestEntryMissing(String),
    #[error("{0}")]
    Other(String),
}

/// An image and its identically named mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePair {
    pub image: std::path::PathBuf,
    pub mask: std::path::PathBuf,
}

impl SamplePair {
    pub fn file_name(&self) -> String {
        self.image
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One decoded, resized sample ready for batching.
#[derive(Debug, Clone)]
pub struct LoadedSample {
    /// Image in CHW layout, normalised to [0, 1].
    pub image_chw: Vec<f32>,
    /// Binary mask in HW layout, values in {0, 1}.
    pub mask: Vec<f32>,
    pub size: u32,
}
