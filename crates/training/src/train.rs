//! Training orchestrator: epochs of train steps, a validation pass, summaries and
//! periodic checkpoints.
//!
//! Epoch metrics are those of the last batch of each split, not an epoch average.

use crate::checkpoint::{checkpoint_dir, SPLIT_MANIFEST_FILE};
use crate::config::TrainConfig;
use crate::context::ExecutionContext;
use crate::error::{check_backbone_input, PreconditionError};
use crate::learner::{PraNetLearner, SegmentationModel, StepMetrics};
use crate::postprocess::{postprocess_for_logging, to_summary_images};
use crate::progress::loop_bar;
use crate::summary::{append_jsonl, summary_dirs, EpochRecord, SummarySink, TensorboardSink};
use anyhow::Context;
use burn::tensor::backend::{AutodiffBackend, Backend};
use models::{PraNet, PraNetConfig};
use polyp_dataset::{AugmentConfig, DatasetProvider, PipelineConfig, SegBatch, SegmentationPipeline, Split};
use std::fs;
use std::time::Instant;

/// Checked in order; nothing is read or built when one fails.
pub fn check_train_preconditions(cfg: &TrainConfig) -> Result<(), PreconditionError> {
    if !cfg.dataset_dir.is_dir() {
        return Err(PreconditionError::MissingDatasetDir(cfg.dataset_dir.clone()));
    }
    check_backbone_input(cfg.backbone_arc, cfg.img_size)
}

pub fn model_config(cfg: &TrainConfig) -> PraNetConfig {
    PraNetConfig {
        img_size: cfg.img_size,
        filters: cfg.filters,
        backbone_arch: cfg.backbone_arc,
        backbone_trainable: cfg.backbone_trainable,
        channel_divisor: cfg.channel_divisor,
    }
}

/// Train PraNet on `cfg.dataset_dir`, logging under `cfg.logdir`.
pub fn run_train<B: AutodiffBackend>(
    ctx: &ExecutionContext<B>,
    cfg: &TrainConfig,
) -> anyhow::Result<Vec<EpochRecord>> {
    check_train_preconditions(cfg)?;
    fs::create_dir_all(&cfg.trained_model_dir).with_context(|| {
        format!("failed to create {}", cfg.trained_model_dir.display())
    })?;

    let (train_dir, val_dir) = summary_dirs(&cfg.logdir, cfg.backbone_arc.as_str(), chrono::Local::now());
    let mut train_sink = TensorboardSink::create(&train_dir)?;
    let mut val_sink = TensorboardSink::create(&val_dir)?;
    tracing::info!(train = %train_dir.display(), val = %val_dir.display(), "writing summaries");

    let pipeline = SegmentationPipeline::new(PipelineConfig {
        root: cfg.dataset_dir.clone(),
        img_size: cfg.img_size,
        batch_size: cfg.batch_size,
        split: cfg.dataset_split,
        seed: ctx.seed,
        augment: if cfg.augment {
            AugmentConfig::train_default()
        } else {
            AugmentConfig::none()
        },
    })?;
    let manifest_path = checkpoint_dir(&cfg.trained_model_dir, cfg.backbone_arc).join(SPLIT_MANIFEST_FILE);
    pipeline
        .splits()
        .manifest(cfg.dataset_split, ctx.seed)
        .save(&manifest_path)?;
    tracing::info!(path = %manifest_path.display(), "saved split manifest");

    train_with(
        ctx,
        cfg,
        &pipeline,
        |cfg, device| {
            let model = PraNet::<B>::new(model_config(cfg), device);
            Ok(PraNetLearner::new(model, cfg.lr, cfg.gclip))
        },
        &mut train_sink,
        &mut val_sink,
    )
}

/// The epoch loop over any provider, model and sinks.
///
/// Preconditions are checked before `build_model` is called.
pub fn train_with<B, P, M, F>(
    ctx: &ExecutionContext<B>,
    cfg: &TrainConfig,
    provider: &P,
    build_model: F,
    train_sink: &mut dyn SummarySink,
    val_sink: &mut dyn SummarySink,
) -> anyhow::Result<Vec<EpochRecord>>
where
    B: Backend,
    P: DatasetProvider<B>,
    M: SegmentationModel<B>,
    F: FnOnce(&TrainConfig, &B::Device) -> anyhow::Result<M>,
{
    check_train_preconditions(cfg)?;
    fs::create_dir_all(&cfg.trained_model_dir)?;
    let mut model = build_model(cfg, &ctx.device)?;

    tracing::info!(
        epochs = cfg.epochs,
        lr = cfg.lr,
        img_size = cfg.img_size,
        batch_size = cfg.batch_size,
        backbone = %cfg.backbone_arc,
        backbone_trainable = cfg.backbone_trainable,
        "training PraNet"
    );

    let ckpt_dir = checkpoint_dir(&cfg.trained_model_dir, cfg.backbone_arc);
    let mut records = Vec::with_capacity(cfg.epochs);
    for epoch in 1..=cfg.epochs {
        let started = Instant::now();

        let bar = loop_bar(provider.batch_count(Split::Train), "training...");
        let mut train_metrics: Option<StepMetrics> = None;
        for batch in provider.load(Split::Train, &ctx.device)? {
            train_metrics = Some(model.train_step(&batch?, cfg.gclip)?);
            bar.inc(1);
        }
        bar.finish_and_clear();
        let train_metrics = train_metrics
            .ok_or_else(|| anyhow::anyhow!("epoch {epoch}: training split yielded no batches"))?;

        let bar = loop_bar(provider.batch_count(Split::Valid), "validating...");
        let mut last_val: Option<(StepMetrics, SegBatch<B>)> = None;
        for batch in provider.load(Split::Valid, &ctx.device)? {
            let batch = batch?;
            let metrics = model.test_step(&batch)?;
            last_val = Some((metrics, batch));
            bar.inc(1);
        }
        bar.finish_and_clear();
        let (val_metrics, val_batch) = last_val
            .ok_or_else(|| anyhow::anyhow!("epoch {epoch}: validation split yielded no batches"))?;

        let elapsed_minutes = (started.elapsed().as_secs_f64() / 60.0 * 100.0).round() / 100.0;
        tracing::info!(
            "ETA:{elapsed_minutes} - epoch: {epoch} - loss: {} - dice: {} - IoU: {} - val_loss: {} - val_dice: {} - val_IoU: {}",
            train_metrics.loss,
            train_metrics.dice,
            train_metrics.iou,
            val_metrics.loss,
            val_metrics.dice,
            val_metrics.iou,
        );

        log_epoch(cfg, epoch, &model, &val_batch, train_metrics, val_metrics, train_sink, val_sink)?;

        let checkpoint = if cfg.checkpoint_every > 0 && epoch % cfg.checkpoint_every == 0 {
            tracing::info!(path = %ckpt_dir.display(), "saving model");
            model.save(&ckpt_dir)?;
            Some(ckpt_dir.clone())
        } else {
            None
        };

        let record = EpochRecord {
            epoch,
            elapsed_minutes,
            train_loss: train_metrics.loss,
            train_dice: train_metrics.dice,
            train_iou: train_metrics.iou,
            val_loss: val_metrics.loss,
            val_dice: val_metrics.dice,
            val_iou: val_metrics.iou,
            checkpoint,
        };
        if let Some(path) = &cfg.metrics_out {
            append_jsonl(path, &record)?;
        }
        records.push(record);
    }
    Ok(records)
}

#[allow(clippy::too_many_arguments)]
fn log_epoch<B: Backend, M: SegmentationModel<B>>(
    cfg: &TrainConfig,
    step: usize,
    model: &M,
    val_batch: &SegBatch<B>,
    train: StepMetrics,
    val: StepMetrics,
    train_sink: &mut dyn SummarySink,
    val_sink: &mut dyn SummarySink,
) -> anyhow::Result<()> {
    tracing::debug!("writing summaries");
    let outputs = model.forward(val_batch.images.clone());
    let max = cfg.batch_size;
    let maps = [
        ("Global S Map", postprocess_for_logging(outputs.global, None)),
        ("S4 Map", postprocess_for_logging(outputs.side4, None)),
        ("S3 Map", postprocess_for_logging(outputs.side3, None)),
        ("S2 Map", postprocess_for_logging(outputs.side2, Some(cfg.side_threshold))),
    ];

    train_sink.scalar("train_loss", train.loss, step)?;
    train_sink.scalar("dice", train.dice, step)?;
    train_sink.scalar("iou", train.iou, step)?;

    val_sink.scalar("val_loss", val.loss, step)?;
    val_sink.scalar("val_dice", val.dice, step)?;
    val_sink.scalar("val_iou", val.iou, step)?;
    val_sink.images(
        "Y_mask",
        &to_summary_images(val_batch.masks.clone().mul_scalar(255.0), max)?,
        step,
    )?;
    for (tag, map) in maps {
        val_sink.images(tag, &to_summary_images(map, max)?, step)?;
    }

    train_sink.flush()?;
    val_sink.flush()
}
