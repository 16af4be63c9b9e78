//! Directory indexing: `<root>/images` paired with `<root>/masks`.

use crate::types::{DatasetError, DatasetResult, SamplePair};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGES_SUBDIR: &str = "images";
pub const MASKS_SUBDIR: &str = "masks";
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// File names of every image under `images_dir`, sorted.
pub fn list_image_names(images_dir: &Path) -> DatasetResult<Vec<String>> {
    let entries = fs::read_dir(images_dir).map_err(|source| DatasetError::Io {
        path: images_dir.to_path_buf(),
        source,
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| DatasetError::Io {
            path: images_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || !is_image_file(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn ensure_dataset_dir(root: &Path) -> DatasetResult<(PathBuf, PathBuf)> {
    if !root.is_dir() {
        return Err(DatasetError::NotADirectory(root.to_path_buf()));
    }
    Ok((root.join(IMAGES_SUBDIR), root.join(MASKS_SUBDIR)))
}

/// Index every image/mask pair under `root`. Every image needs a mask of the same name.
pub fn index_pairs(root: &Path) -> DatasetResult<Vec<SamplePair>> {
    let (images_dir, masks_dir) = ensure_dataset_dir(root)?;
    let mut pairs = Vec::new();
    for name in list_image_names(&images_dir)? {
        let image = images_dir.join(&name);
        let mask = masks_dir.join(&name);
        if !mask.is_file() {
            return Err(DatasetError::MissingMask { image, mask });
        }
        pairs.push(SamplePair { image, mask });
    }
    Ok(pairs)
}

/// Uniformly pick `floor(len * percentage)` distinct images and their mask paths.
///
/// Mask paths are derived by name and not checked here; a missing mask surfaces
/// when it is read.
pub fn select_random_images<R: Rng + ?Sized>(
    directory: &Path,
    percentage: f64,
    rng: &mut R,
) -> DatasetResult<(Vec<PathBuf>, Vec<PathBuf>)> {
    if !percentage.is_finite() || !(0.0..=1.0).contains(&percentage) {
        return Err(DatasetError::InvalidPercentage(percentage));
    }
    let (images_dir, masks_dir) = ensure_dataset_dir(directory)?;
    let names = list_image_names(&images_dir)?;
    let count = (names.len() as f64 * percentage).floor() as usize;
    if count == 0 {
        return Err(DatasetError::EmptySelection {
            available: names.len(),
            percentage,
        });
    }

    let selected: Vec<&String> = names.choose_multiple(rng, count).collect();
    let images = selected.iter().map(|n| images_dir.join(n)).collect();
    let masks = selected.iter().map(|n| masks_dir.join(n)).collect();
    Ok((images, masks))
}
