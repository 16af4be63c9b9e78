//! Command-line arguments. Every flag is optional and, when given, overrides the
//! config file, which overrides the built-in defaults.

use crate::config::{RunConfig, TestConfig, TrainConfig, VisualizeConfig};
use clap::Parser;
use cli_support::CommonArgs;
use models::BackboneArch;
use std::path::PathBuf;

macro_rules! apply {
    ($cfg:expr, $($field:ident),+ $(,)?) => {
        $(if let Some(v) = $field { $cfg.$field = v; })+
    };
}

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train PraNet on an images/ + masks/ polyp dataset")]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Dataset root containing images/ and masks/.
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,
    /// Directory receiving pranet_<backbone>/ checkpoints.
    #[arg(long)]
    pub trained_model_dir: Option<PathBuf>,
    #[arg(long)]
    pub img_size: Option<u32>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long)]
    pub lr: Option<f64>,
    /// Gradient clipping value.
    #[arg(long)]
    pub gclip: Option<f32>,
    /// Fraction held out for each of validation and test.
    #[arg(long)]
    pub dataset_split: Option<f64>,
    #[arg(long)]
    pub backbone_trainable: Option<bool>,
    /// resnet50 or mobilenetv2.
    #[arg(long)]
    pub backbone_arc: Option<BackboneArch>,
    #[arg(long)]
    pub logdir: Option<PathBuf>,
    #[arg(long)]
    pub checkpoint_every: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    /// Append one JSON line per epoch to this file.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

impl TrainArgs {
    pub fn resolve(self) -> anyhow::Result<TrainConfig> {
        let mut cfg = RunConfig::load(self.common.config.as_deref())?.train;
        let TrainArgs {
            dataset_dir,
            trained_model_dir,
            img_size,
            batch_size,
            epochs,
            lr,
            gclip,
            dataset_split,
            backbone_trainable,
            backbone_arc,
            logdir,
            checkpoint_every,
            seed,
            metrics_out,
            ..
        } = self;
        apply!(
            cfg,
            dataset_dir,
            trained_model_dir,
            img_size,
            batch_size,
            epochs,
            lr,
            gclip,
            dataset_split,
            backbone_trainable,
            backbone_arc,
            logdir,
            checkpoint_every,
            seed,
        );
        if metrics_out.is_some() {
            cfg.metrics_out = metrics_out;
        }
        Ok(cfg)
    }
}

#[derive(Parser, Debug)]
#[command(name = "eval", about = "Evaluate a PraNet checkpoint on the test split")]
pub struct EvalArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Checkpoint directory (pranet_<backbone>).
    #[arg(long)]
    pub model_path: Option<PathBuf>,
    #[arg(long)]
    pub dataset_path: Option<PathBuf>,
    #[arg(long)]
    pub imgsize: Option<u32>,
    /// Binarisation threshold, strictly between 0 and 1.
    #[arg(long)]
    pub threshold: Option<f32>,
    #[arg(long)]
    pub dataset_split: Option<f64>,
    /// Split seed, used only when the checkpoint has no split manifest.
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long)]
    pub warmup: Option<usize>,
    /// Write the report as JSON.
    #[arg(long)]
    pub report_out: Option<PathBuf>,
}

impl EvalArgs {
    pub fn resolve(self) -> anyhow::Result<TestConfig> {
        let mut cfg = RunConfig::load(self.common.config.as_deref())?.test;
        let EvalArgs {
            model_path,
            dataset_path,
            imgsize,
            threshold,
            dataset_split,
            seed,
            warmup,
            report_out,
            ..
        } = self;
        apply!(cfg, model_path, dataset_path, imgsize, threshold, dataset_split, seed, warmup);
        if report_out.is_some() {
            cfg.report_out = report_out;
        }
        Ok(cfg)
    }
}

#[derive(Parser, Debug)]
#[command(name = "visualize", about = "Export prediction grids for a random subset of a dataset")]
pub struct VisualizeArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[arg(long)]
    pub model_path: Option<PathBuf>,
    #[arg(long)]
    pub dataset_path: Option<PathBuf>,
    #[arg(long)]
    pub imgsize: Option<u32>,
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Fraction of images/ to export.
    #[arg(long)]
    pub percentage: Option<f64>,
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
    #[arg(long)]
    pub seed: Option<u64>,
}

impl VisualizeArgs {
    pub fn resolve(self) -> anyhow::Result<VisualizeConfig> {
        let mut cfg = RunConfig::load(self.common.config.as_deref())?.visualize;
        let VisualizeArgs {
            model_path,
            dataset_path,
            imgsize,
            threshold,
            percentage,
            results_dir,
            seed,
            ..
        } = self;
        apply!(cfg, model_path, dataset_path, imgsize, threshold, percentage, results_dir);
        if seed.is_some() {
            cfg.seed = seed;
        }
        Ok(cfg)
    }
}
