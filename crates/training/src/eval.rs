//! Evaluation orchestrator: per-sample metrics and latency over the test split.

use crate::checkpoint::{load_pranet, SPLIT_MANIFEST_FILE};
use crate::config::TestConfig;
use crate::context::ExecutionContext;
use crate::error::check_inference_inputs;
use crate::learner::Predictor;
use crate::progress::loop_bar;
use anyhow::Context;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use polyp_dataset::{
    AugmentConfig, DatasetProvider, PipelineConfig, SegmentationPipeline, Split, SplitManifest,
};
use seg_metrics::{score_all, SampleScores, SegMap};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Per-sample metric lists for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunAggregate {
    pub dice: Vec<f64>,
    pub iou: Vec<f64>,
    pub mae: Vec<f64>,
    pub weighted_fbeta: Vec<f64>,
    pub s_measure: Vec<f64>,
    pub e_measure: Vec<f64>,
    pub runtime_ms: Vec<f64>,
}

impl RunAggregate {
    pub fn push(&mut self, scores: SampleScores, runtime_ms: f64) {
        self.dice.push(scores.dice);
        self.iou.push(scores.iou);
        self.mae.push(scores.mae);
        self.weighted_fbeta.push(scores.weighted_fbeta);
        self.s_measure.push(scores.s_measure);
        self.e_measure.push(scores.e_measure);
        self.runtime_ms.push(runtime_ms);
    }

    pub fn len(&self) -> usize {
        self.dice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dice.is_empty()
    }

    pub fn report(&self, threshold: f32, warmup: usize) -> anyhow::Result<EvalReport> {
        let m = |v: &[f64]| mean(v).ok_or_else(|| anyhow::anyhow!("test split yielded no samples"));
        Ok(EvalReport {
            samples: self.len(),
            threshold,
            warmup,
            mean_dice: m(&self.dice)?,
            mean_iou: m(&self.iou)?,
            mean_mae: m(&self.mae)?,
            mean_weighted_fbeta: m(&self.weighted_fbeta)?,
            mean_s_measure: m(&self.s_measure)?,
            mean_e_measure: m(&self.e_measure)?,
            mean_runtime_ms: mean_excluding_warmup(&self.runtime_ms, warmup),
        })
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean over everything after the first `warmup` values; `None` if nothing is left.
pub fn mean_excluding_warmup(values: &[f64], warmup: usize) -> Option<f64> {
    values.get(warmup..).and_then(mean)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub samples: usize,
    pub threshold: f32,
    pub warmup: usize,
    pub mean_dice: f64,
    pub mean_iou: f64,
    pub mean_mae: f64,
    pub mean_weighted_fbeta: f64,
    pub mean_s_measure: f64,
    pub mean_e_measure: f64,
    /// Unavailable when the run had no samples past the warm-up.
    pub mean_runtime_ms: Option<f64>,
}

impl EvalReport {
    pub fn log(&self) {
        tracing::info!(
            samples = self.samples,
            threshold = self.threshold,
            "Mean Dice: {:.4}, Mean IoU: {:.4}, Mean MAE: {:.4}, Mean wFbeta: {:.4}, Mean S-measure: {:.4}, Mean E-measure: {:.4}",
            self.mean_dice,
            self.mean_iou,
            self.mean_mae,
            self.mean_weighted_fbeta,
            self.mean_s_measure,
            self.mean_e_measure,
        );
        match self.mean_runtime_ms {
            Some(ms) => tracing::info!("Mean runtime: {ms:.2} ms (first {} samples excluded)", self.warmup),
            None => tracing::warn!(
                "Mean runtime unavailable: {} samples, {} excluded as warm-up",
                self.samples,
                self.warmup
            ),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn planes<B: Backend>(x: Tensor<B, 4>) -> anyhow::Result<Vec<SegMap>> {
    let [n, _, h, w] = x.dims();
    let values = x
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("failed to read tensor: {e:?}"))?;
    values
        .chunks(h * w)
        .take(n)
        .map(|c| SegMap::new(w, h, c.to_vec()).map_err(anyhow::Error::from))
        .collect()
}

/// Test-split pipeline for the checkpoint at `cfg.model_path`.
///
/// The split training recorded next to the weights is used when present, so the
/// test images are exactly those held out during training. Otherwise the data is
/// split afresh with `seed`.
pub fn test_pipeline(cfg: &TestConfig, seed: u64) -> anyhow::Result<SegmentationPipeline> {
    let pipeline_cfg = PipelineConfig {
        root: cfg.dataset_path.clone(),
        img_size: cfg.imgsize,
        batch_size: 1,
        split: cfg.dataset_split,
        seed,
        augment: AugmentConfig::none(),
    };
    let manifest_path = cfg.model_path.join(SPLIT_MANIFEST_FILE);
    if manifest_path.is_file() {
        let manifest = SplitManifest::load(&manifest_path)?;
        if manifest.split_ratio != cfg.dataset_split {
            tracing::warn!(
                recorded = manifest.split_ratio,
                requested = cfg.dataset_split,
                "dataset_split differs from the training run; using the recorded split"
            );
        }
        tracing::info!(path = %manifest_path.display(), seed = manifest.seed, "using the recorded split");
        Ok(SegmentationPipeline::with_manifest(pipeline_cfg, &manifest)?)
    } else {
        tracing::warn!(seed, "no split manifest next to the checkpoint; splitting afresh");
        Ok(SegmentationPipeline::new(pipeline_cfg)?)
    }
}

/// Load the checkpoint at `cfg.model_path` and evaluate it on the test split.
pub fn run_test<B: Backend>(ctx: &ExecutionContext<B>, cfg: &TestConfig) -> anyhow::Result<EvalReport> {
    check_inference_inputs(&cfg.model_path, &cfg.dataset_path, cfg.threshold)?;
    let model = load_pranet::<B>(&cfg.model_path, &ctx.device)?;
    let pipeline = test_pipeline(cfg, ctx.seed)?;
    let report = run_test_with(ctx, cfg, &model, &pipeline)?;
    if let Some(path) = &cfg.report_out {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote evaluation report");
    }
    Ok(report)
}

/// The per-sample loop over any predictor and provider.
pub fn run_test_with<B, M, P>(
    ctx: &ExecutionContext<B>,
    cfg: &TestConfig,
    model: &M,
    provider: &P,
) -> anyhow::Result<EvalReport>
where
    B: Backend,
    M: Predictor<B>,
    P: DatasetProvider<B>,
{
    let mut agg = RunAggregate::default();
    let bar = loop_bar(provider.batch_count(Split::Test), "testing...");
    for batch in provider.load(Split::Test, &ctx.device)? {
        let batch = batch?;
        let started = Instant::now();
        let outputs = model.predict(batch.images);
        let pred = sigmoid(outputs.side2).greater_elem(cfg.threshold).float();
        let preds = planes(pred)?;
        let runtime_ms = round2(started.elapsed().as_secs_f64() * 1000.0);

        let masks = planes(batch.masks)?;
        for (gt, pred) in masks.iter().zip(&preds) {
            agg.push(score_all(gt, pred)?, runtime_ms);
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let report = agg.report(cfg.threshold, cfg.warmup)?;
    report.log();
    Ok(report)
}
