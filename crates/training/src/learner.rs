//! The model surface the orchestrators drive, and its PraNet implementation.

use crate::checkpoint::save_pranet;
use crate::loss::{overlap_scores, scalar, StructureLoss};
use burn::grad_clipping::GradientClipping;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use models::{PraNet, SideOutputs};
use polyp_dataset::SegBatch;
use serde::Serialize;
use std::path::Path;

/// Loss, dice and IoU of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StepMetrics {
    pub loss: f32,
    pub dice: f32,
    pub iou: f32,
}

/// What the training loop needs from a model.
pub trait SegmentationModel<B: Backend> {
    /// One optimiser update on `batch`, gradients clipped by value at `gclip`.
    fn train_step(&mut self, batch: &SegBatch<B>, gclip: f32) -> anyhow::Result<StepMetrics>;
    /// Loss and scores without updating anything.
    fn test_step(&self, batch: &SegBatch<B>) -> anyhow::Result<StepMetrics>;
    /// Inference-mode forward pass.
    fn forward(&self, images: Tensor<B, 4>) -> SideOutputs<B>;
    /// Write a self-sufficient checkpoint directory.
    fn save(&self, dir: &Path) -> anyhow::Result<()>;
}

/// Inference-only surface used by evaluation and export.
pub trait Predictor<B: Backend> {
    fn predict(&self, images: Tensor<B, 4>) -> SideOutputs<B>;
}

impl<B: Backend> Predictor<B> for PraNet<B> {
    fn predict(&self, images: Tensor<B, 4>) -> SideOutputs<B> {
        self.forward(images)
    }
}

type PraNetOptimizer<B> = OptimizerAdaptor<Adam, PraNet<B>, B>;

/// PraNet with its Adam state and structure loss.
pub struct PraNetLearner<B: AutodiffBackend> {
    model: PraNet<B>,
    optim: PraNetOptimizer<B>,
    loss: StructureLoss,
    lr: f64,
    gclip: f32,
}

impl<B: AutodiffBackend> PraNetLearner<B> {
    pub fn new(model: PraNet<B>, lr: f64, gclip: f32) -> Self {
        let optim = AdamConfig::new()
            .init::<B, PraNet<B>>()
            .with_grad_clipping(GradientClipping::Value(gclip));
        Self {
            model,
            optim,
            loss: StructureLoss::new(),
            lr,
            gclip,
        }
    }

    /// Re-arms clipping when `gclip` differs from the value in force. Adam moments are kept.
    fn use_clip(&mut self, gclip: f32) {
        if gclip.to_bits() != self.gclip.to_bits() {
            tracing::debug!(from = self.gclip, to = gclip, "changing gradient clip");
            self.optim = self
                .optim
                .clone()
                .with_grad_clipping(GradientClipping::Value(gclip));
            self.gclip = gclip;
        }
    }
}

impl<B: AutodiffBackend> SegmentationModel<B> for PraNetLearner<B> {
    fn train_step(&mut self, batch: &SegBatch<B>, gclip: f32) -> anyhow::Result<StepMetrics> {
        self.use_clip(gclip);
        let outputs = self.model.forward(batch.images.clone());
        let loss = self.loss.forward(&outputs, batch.masks.clone());
        let (dice, iou) = overlap_scores(outputs.side2.detach(), batch.masks.clone())?;
        let loss_value = scalar(loss.clone().detach())?;

        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(self.lr, self.model.clone(), grads);
        Ok(StepMetrics {
            loss: loss_value,
            dice,
            iou,
        })
    }

    fn test_step(&self, batch: &SegBatch<B>) -> anyhow::Result<StepMetrics> {
        let model = self.model.valid();
        let masks = batch.masks.clone().inner();
        let outputs = model.forward(batch.images.clone().inner());
        let loss = scalar(self.loss.forward(&outputs, masks.clone()))?;
        let (dice, iou) = overlap_scores(outputs.side2, masks)?;
        Ok(StepMetrics { loss, dice, iou })
    }

    fn forward(&self, images: Tensor<B, 4>) -> SideOutputs<B> {
        self.model
            .valid()
            .forward(images.inner())
            .map(Tensor::from_inner)
    }

    fn save(&self, dir: &Path) -> anyhow::Result<()> {
        save_pranet(&self.model, dir)
    }
}
