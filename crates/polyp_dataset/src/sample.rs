//! Decoding and resizing of image/mask files.

use crate::aug::AugmentConfig;
use crate::types::{DatasetError, DatasetResult, LoadedSample, SamplePair};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use rand::Rng;
use std::path::Path;

/// Mask pixels above this grey level count as polyp.
const MASK_LEVEL: u8 = 127;

pub fn open_rgb(path: &Path) -> DatasetResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })
}

pub fn open_luma(path: &Path) -> DatasetResult<GrayImage> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|source| DatasetError::Image {
            path: path.to_path_buf(),
            source,
        })
}

/// CHW floats in [0, 1].
pub fn rgb_to_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (i, px) in img.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = px[c] as f32 / 255.0;
        }
    }
    out
}

pub fn mask_to_binary(mask: &GrayImage) -> Vec<f32> {
    mask.pixels()
        .map(|p| if p[0] > MASK_LEVEL { 1.0 } else { 0.0 })
        .collect()
}

/// Decode one pair, augment it, and resize both to `size`×`size`.
pub fn load_pair<R: Rng + ?Sized>(
    pair: &SamplePair,
    size: u32,
    augment: &AugmentConfig,
    rng: &mut R,
) -> DatasetResult<LoadedSample> {
    let image = open_rgb(&pair.image)?;
    let mask = open_luma(&pair.mask)?;
    let (image, mask) = if augment.is_identity() {
        (image, mask)
    } else {
        augment.apply(image, mask, rng)
    };
    let image = imageops::resize(&image, size, size, FilterType::Triangle);
    let mask = imageops::resize(&mask, size, size, FilterType::Triangle);
    Ok(LoadedSample {
        image_chw: rgb_to_chw(&image),
        mask: mask_to_binary(&mask),
        size,
    })
}

/// A single image prepared for inference, with the untouched original kept for display.
#[derive(Debug, Clone)]
pub struct ExportImage {
    pub input_chw: Vec<f32>,
    pub size: u32,
    pub original: RgbImage,
}

impl ExportImage {
    /// `[1, 3, size, size]` input tensor.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        let s = self.size as usize;
        Tensor::<B, 4>::from_data(TensorData::new(self.input_chw.clone(), [1, 3, s, s]), device)
    }
}

pub fn read_image(path: &Path, img_size: u32) -> DatasetResult<ExportImage> {
    let original = open_rgb(path)?;
    let resized = imageops::resize(&original, img_size, img_size, FilterType::Triangle);
    Ok(ExportImage {
        input_chw: rgb_to_chw(&resized),
        size: img_size,
        original,
    })
}

/// The mask at its original resolution.
pub fn read_mask(path: &Path) -> DatasetResult<GrayImage> {
    open_luma(path)
}
