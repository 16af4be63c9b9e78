//! Turning logit maps into something a person can look at.
//!
//! Logging and export have different contracts and each has its own function.

use crate::summary::SummaryImage;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, RgbImage};

fn probabilities<B: Backend, const D: usize>(x: Tensor<B, D>, threshold: Option<f32>) -> Tensor<B, D> {
    let x = sigmoid(x);
    match threshold {
        Some(t) => x.greater_elem(t).float(),
        None => x,
    }
}

/// Sigmoid, then `> threshold` when given, scaled to 0..=255. Shape is unchanged.
pub fn postprocess_for_logging<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    threshold: Option<f32>,
) -> Tensor<B, D> {
    probabilities(x, threshold).mul_scalar(255.0)
}

/// Splits a `[N, 1, H, W]` map of 0..=255 values into at most `max` images.
pub fn to_summary_images<B: Backend>(
    x: Tensor<B, 4>,
    max: usize,
) -> anyhow::Result<Vec<SummaryImage>> {
    let [n, _, h, w] = x.dims();
    let plane = h * w;
    let values = x
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read summary map: {e:?}"))?;
    Ok(values
        .chunks(plane.max(1))
        .take(n.min(max))
        .map(|chunk| SummaryImage {
            width: w,
            height: h,
            pixels: chunk.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect(),
        })
        .collect())
}

/// First map of a `[N, 1, S, S]` batch as a display image at `(width, height)`.
///
/// Sigmoid, `> threshold` when given, bicubic resize back to the original
/// resolution, then the channel is replicated to RGB.
pub fn postprocess_for_export<B: Backend>(
    x: Tensor<B, 4>,
    (width, height): (u32, u32),
    threshold: Option<f32>,
) -> anyhow::Result<RgbImage> {
    let [_, _, h, w] = x.dims();
    let first = x.slice([0..1, 0..1, 0..h, 0..w]);
    let values = probabilities(first, threshold)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read output map: {e:?}"))?;
    let map: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::from_raw(w as u32, h as u32, values)
        .ok_or_else(|| anyhow::anyhow!("output map buffer does not match {w}x{h}"))?;
    let resized = imageops::resize(&map, width, height, FilterType::CatmullRom);

    let mut out = RgbImage::new(width, height);
    for (dst, src) in out.pixels_mut().zip(resized.pixels()) {
        let v = (src[0].clamp(0.0, 1.0) * 255.0).round() as u8;
        *dst = Rgb([v, v, v]);
    }
    Ok(out)
}
