//! Summary logs (TensorBoard event files) and the per-epoch JSON-lines record.

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tensorboard_rs::summary_writer::SummaryWriter;

/// An 8-bit single-channel image.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl SummaryImage {
    /// Channel-replicated CHW buffer.
    pub fn to_rgb_chw(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 3);
        for _ in 0..3 {
            out.extend_from_slice(&self.pixels);
        }
        out
    }
}

/// Append-only sink for scalar and image summaries.
pub trait SummarySink {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> anyhow::Result<()>;
    /// One entry per image, tagged `tag/<index>`.
    fn images(&mut self, tag: &str, images: &[SummaryImage], step: usize) -> anyhow::Result<()>;
    fn flush(&mut self) -> anyhow::Result<()>;
}

pub struct TensorboardSink {
    writer: SummaryWriter,
}

impl TensorboardSink {
    pub fn create(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create summary dir {}", dir.display()))?;
        Ok(Self {
            writer: SummaryWriter::new(dir),
        })
    }
}

impl SummarySink for TensorboardSink {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> anyhow::Result<()> {
        self.writer.add_scalar(tag, value, step);
        Ok(())
    }

    fn images(&mut self, tag: &str, images: &[SummaryImage], step: usize) -> anyhow::Result<()> {
        for (i, img) in images.iter().enumerate() {
            let data = img.to_rgb_chw();
            self.writer
                .add_image(&format!("{tag}/{i}"), &data, &[3, img.height, img.width], step);
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush();
        Ok(())
    }
}

/// `<logdir>/PRAnet/PRAnet_<backbone>_<YYYYmmdd-HHMMSS>/{train,val}`.
pub fn summary_dirs(logdir: &Path, backbone: &str, now: DateTime<Local>) -> (PathBuf, PathBuf) {
    let run = logdir
        .join("PRAnet")
        .join(format!("PRAnet_{backbone}_{}", now.format("%Y%m%d-%H%M%S")));
    (run.join("train"), run.join("val"))
}

#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub elapsed_minutes: f64,
    pub train_loss: f32,
    pub train_dice: f32,
    pub train_iou: f32,
    pub val_loss: f32,
    pub val_dice: f32,
    pub val_iou: f32,
    pub checkpoint: Option<PathBuf>,
}

pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open metrics file {}", path.display()))?;
    writeln!(f, "{}", serde_json::to_string(record)?)?;
    Ok(())
}
