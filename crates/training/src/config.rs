//! Run configuration: built-in defaults, overridden by a TOML file, overridden by CLI flags.

use anyhow::Context;
use models::BackboneArch;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_NAME: &str = "pranet.toml";
pub const CONFIG_ENV: &str = "PRANET_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub dataset_dir: PathBuf,
    pub trained_model_dir: PathBuf,
    pub img_size: u32,
    pub batch_size: usize,
    pub epochs: usize,
    pub lr: f64,
    pub gclip: f32,
    pub dataset_split: f64,
    pub backbone_trainable: bool,
    pub backbone_arc: BackboneArch,
    pub logdir: PathBuf,
    pub filters: usize,
    /// Divides every backbone stage width; 1 keeps the named architecture.
    pub channel_divisor: usize,
    pub checkpoint_every: usize,
    /// Threshold applied to the finest map before it is logged as an image.
    pub side_threshold: f32,
    pub seed: u64,
    /// Random flips on the training split.
    pub augment: bool,
    /// Optional JSON-lines file receiving one record per epoch.
    pub metrics_out: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("polyps_dataset/"),
            trained_model_dir: PathBuf::from("trained_model/"),
            img_size: 352,
            batch_size: 8,
            epochs: 25,
            lr: 1e-3,
            gclip: 1.0,
            dataset_split: 0.1,
            backbone_trainable: true,
            backbone_arc: BackboneArch::Resnet50,
            logdir: PathBuf::from("logs/"),
            filters: 32,
            channel_divisor: 1,
            checkpoint_every: 5,
            side_threshold: 0.3,
            seed: 41,
            augment: true,
            metrics_out: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub model_path: PathBuf,
    pub dataset_path: PathBuf,
    pub imgsize: u32,
    /// Binarisation threshold for the finest map.
    pub threshold: f32,
    pub dataset_split: f64,
    /// Seeds the execution context. Only used for splitting when the checkpoint has no split manifest.
    pub seed: u64,
    /// Leading samples left out of the latency mean.
    pub warmup: usize,
    pub report_out: Option<PathBuf>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("trained_model/pranet_resnet50"),
            dataset_path: PathBuf::from("polyps_dataset/"),
            imgsize: 352,
            threshold: 0.5,
            dataset_split: 0.1,
            seed: 41,
            warmup: 3,
            report_out: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizeConfig {
    pub model_path: PathBuf,
    pub dataset_path: PathBuf,
    pub imgsize: u32,
    pub threshold: f32,
    /// Fraction of `images/` to export.
    pub percentage: f64,
    pub results_dir: PathBuf,
    /// Seeds the execution context and so the selection; random when absent.
    pub seed: Option<u64>,
}

impl Default for VisualizeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("trained_model/pranet_resnet50"),
            dataset_path: PathBuf::from("polyps_dataset/"),
            imgsize: 352,
            threshold: 0.5,
            percentage: 0.05,
            results_dir: PathBuf::from("results"),
            seed: None,
        }
    }
}

/// The `[train]`, `[test]` and `[visualize]` tables of a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub train: TrainConfig,
    pub test: TestConfig,
    pub visualize: VisualizeConfig,
}

impl RunConfig {
    /// Explicit path first, then `$PRANET_CONFIG`, then `./pranet.toml` if it exists.
    ///
    /// A path that was asked for but cannot be read is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Self::from_path(Path::new(&path));
            }
        }
        let default = Path::new(DEFAULT_CONFIG_NAME);
        if default.is_file() {
            return Self::from_path(default);
        }
        Ok(Self::default())
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: RunConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(cfg)
    }
}
