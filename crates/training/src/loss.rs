//! Structure loss (edge-weighted BCE + weighted Dice) with deep supervision, and
//! batch overlap scores.

use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use models::SideOutputs;

const EDGE_KERNEL: usize = 31;
const EDGE_WEIGHT: f32 = 5.0;
const SCORE_EPS: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct StructureLoss {
    pool: AvgPool2d,
}

impl Default for StructureLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl StructureLoss {
    pub fn new() -> Self {
        let pad = EDGE_KERNEL / 2;
        let pool = AvgPool2dConfig::new([EDGE_KERNEL, EDGE_KERNEL])
            .with_strides([1, 1])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .with_count_include_pad(true)
            .init();
        Self { pool }
    }

    /// Loss of a single logit map against a binary mask, averaged over the batch.
    pub fn single<B: Backend>(&self, logits: Tensor<B, 4>, mask: Tensor<B, 4>) -> Tensor<B, 1> {
        // Pixels near the mask boundary weigh up to 1 + EDGE_WEIGHT.
        let weight = (self.pool.forward(mask.clone()) - mask.clone())
            .abs()
            .mul_scalar(EDGE_WEIGHT)
            .add_scalar(1.0);

        // max(x, 0) - x*z + log(1 + exp(-|x|))
        let bce = logits.clone().clamp_min(0.0) - logits.clone() * mask.clone()
            + logits.clone().abs().neg().exp().log1p();
        let weight_sum = weight.clone().sum_dim(2).sum_dim(3);
        let wbce = (weight.clone() * bce).sum_dim(2).sum_dim(3) / weight_sum;

        let prob = sigmoid(logits);
        let inter = (prob.clone() * mask.clone() * weight.clone())
            .sum_dim(2)
            .sum_dim(3);
        let total = ((prob + mask) * weight).sum_dim(2).sum_dim(3);
        let wdice = (inter.mul_scalar(2.0).add_scalar(1.0) / total.add_scalar(1.0))
            .neg()
            .add_scalar(1.0);

        (wbce + wdice).mean()
    }

    /// Sum over the four maps.
    pub fn forward<B: Backend>(&self, outputs: &SideOutputs<B>, mask: Tensor<B, 4>) -> Tensor<B, 1> {
        outputs
            .clone()
            .into_array()
            .into_iter()
            .map(|map| self.single(map, mask.clone()))
            .reduce(|a, b| a + b)
            .unwrap_or_else(|| Tensor::zeros([1], &mask.device()))
    }
}

/// First element of `t` on the host.
pub(crate) fn scalar<B: Backend, const D: usize>(t: Tensor<B, D>) -> anyhow::Result<f32> {
    let values = t
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read scalar: {e:?}"))?;
    values
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("expected a scalar, got an empty tensor"))
}

/// Dice and IoU of `sigmoid(logits) > 0.5` against `mask`, pooled over the batch.
pub fn overlap_scores<B: Backend>(
    logits: Tensor<B, 4>,
    mask: Tensor<B, 4>,
) -> anyhow::Result<(f32, f32)> {
    let pred = sigmoid(logits).greater_elem(0.5).float();
    let inter = scalar((pred.clone() * mask.clone()).sum())?;
    let pred_sum = scalar(pred.sum())?;
    let mask_sum = scalar(mask.sum())?;
    let dice = (2.0 * inter + SCORE_EPS) / (pred_sum + mask_sum + SCORE_EPS);
    let iou = (inter + SCORE_EPS) / (pred_sum + mask_sum - inter + SCORE_EPS);
    Ok((dice, iou))
}
