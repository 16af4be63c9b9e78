use models::BackboneArch;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A run refused to start. Nothing has been loaded or built when one of these is returned.
#[derive(Debug, Error, PartialEq)]
pub enum PreconditionError {
    #[error("No dir named {} exist", .0.display())]
    MissingDatasetDir(PathBuf),
    #[error("For backbone {arch} inputsize should be {min} < inputsize <= {max}, got {img_size}")]
    BackboneInputSize {
        arch: BackboneArch,
        img_size: u32,
        min: u32,
        max: u32,
    },
    #[error("model path does not exist: {}", .0.display())]
    MissingModelPath(PathBuf),
    #[error("dataset path does not exist: {}", .0.display())]
    MissingDatasetPath(PathBuf),
    #[error("threshold must be strictly between 0 and 1, got {0}")]
    ThresholdOutOfRange(f32),
}

pub fn check_backbone_input(arch: BackboneArch, img_size: u32) -> Result<(), PreconditionError> {
    match arch.input_size_bounds() {
        Some((min, max)) if img_size <= min || img_size > max => {
            Err(PreconditionError::BackboneInputSize {
                arch,
                img_size,
                min,
                max,
            })
        }
        _ => Ok(()),
    }
}

/// Shared by evaluation and export.
pub fn check_inference_inputs(
    model_path: &Path,
    dataset_path: &Path,
    threshold: f32,
) -> Result<(), PreconditionError> {
    if !model_path.exists() {
        return Err(PreconditionError::MissingModelPath(model_path.to_path_buf()));
    }
    if !dataset_path.exists() {
        return Err(PreconditionError::MissingDatasetPath(dataset_path.to_path_buf()));
    }
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(PreconditionError::ThresholdOutOfRange(threshold));
    }
    Ok(())
}
