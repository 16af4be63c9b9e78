//! Checkpoint directories: `model.bin` (Burn full-precision record) and `config.json`.

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use models::{BackboneArch, PraNet, PraNetConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Stem of the weights file; the recorder appends `.bin`.
pub const WEIGHTS_STEM: &str = "model";
pub const CONFIG_FILE: &str = "config.json";
/// Written by training next to the weights; evaluation reuses its test split.
pub const SPLIT_MANIFEST_FILE: &str = "split_manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub model: PraNetConfig,
    pub saved_at: String,
}

/// `<trained_model_dir>/pranet_<arch>`.
pub fn checkpoint_dir(trained_model_dir: &Path, arch: BackboneArch) -> PathBuf {
    trained_model_dir.join(format!("pranet_{arch}"))
}

pub fn save_pranet<B: Backend>(model: &PraNet<B>, dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create checkpoint dir {}", dir.display()))?;
    let meta = CheckpointMeta {
        model: model.config.0.clone(),
        saved_at: chrono::Local::now().to_rfc3339(),
    };
    fs::write(dir.join(CONFIG_FILE), serde_json::to_string_pretty(&meta)?)?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(dir.join(WEIGHTS_STEM), &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
    Ok(())
}

pub fn load_meta(dir: &Path) -> anyhow::Result<CheckpointMeta> {
    let path = dir.join(CONFIG_FILE);
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn load_pranet<B: Backend>(dir: &Path, device: &B::Device) -> anyhow::Result<PraNet<B>> {
    let meta = load_meta(dir)?;
    tracing::info!(path = %dir.display(), backbone = %meta.model.backbone_arch, "loading model from disk");
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    PraNet::<B>::new(meta.model, device)
        .load_file(dir.join(WEIGHTS_STEM), &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", dir.display()))
}
