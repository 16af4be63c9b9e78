#![allow(dead_code)]

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use image::{GrayImage, Luma, Rgb, RgbImage};
use models::SideOutputs;
use polyp_dataset::{DatasetProvider, DatasetResult, SegBatch, Split};
use std::cell::Cell;
use std::path::Path;
use training::{SegmentationModel, StepMetrics, SummaryImage, SummarySink, TrainConfig};

pub type B = burn_ndarray::NdArray<f32>;

/// `count` 24x20 frames with a bright blob and its mask.
pub fn write_dataset(root: &Path, count: usize) {
    std::fs::create_dir_all(root.join("images")).unwrap();
    std::fs::create_dir_all(root.join("masks")).unwrap();
    for i in 0..count {
        let name = format!("cju{i:04}.png");
        let mut img = RgbImage::from_pixel(24, 20, Rgb([90, 30, 30]));
        let mut mask = GrayImage::new(24, 20);
        let off = (i % 6) as u32;
        for y in 5..13 {
            for x in (4 + off)..(12 + off) {
                img.put_pixel(x, y, Rgb([230, 180, 160]));
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        img.save(root.join("images").join(&name)).unwrap();
        mask.save(root.join("masks").join(&name)).unwrap();
    }
}

pub fn tiny_train_config(root: &Path) -> TrainConfig {
    TrainConfig {
        dataset_dir: root.join("data"),
        trained_model_dir: root.join("trained"),
        logdir: root.join("logs"),
        img_size: 32,
        batch_size: 4,
        epochs: 1,
        filters: 4,
        channel_divisor: 16,
        checkpoint_every: 1,
        dataset_split: 0.2,
        augment: false,
        ..TrainConfig::default()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub scalars: Vec<(String, f32, usize)>,
    pub images: Vec<(String, usize, usize)>,
    pub flushes: usize,
}

impl RecordingSink {
    pub fn scalar_at(&self, tag: &str, step: usize) -> Option<f32> {
        self.scalars
            .iter()
            .find(|(t, _, s)| t == tag && *s == step)
            .map(|(_, v, _)| *v)
    }
}

impl SummarySink for RecordingSink {
    fn scalar(&mut self, tag: &str, value: f32, step: usize) -> anyhow::Result<()> {
        self.scalars.push((tag.to_string(), value, step));
        Ok(())
    }

    fn images(&mut self, tag: &str, images: &[SummaryImage], step: usize) -> anyhow::Result<()> {
        self.images.push((tag.to_string(), images.len(), step));
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

/// Yields `train` and `valid` batches of zeros, `batch` images of `size` px each.
pub struct FakeProvider {
    pub train: usize,
    pub valid: usize,
    pub batch: usize,
    pub size: usize,
    pub loads: Cell<usize>,
}

impl FakeProvider {
    pub fn new(train: usize, valid: usize) -> Self {
        Self {
            train,
            valid,
            batch: 2,
            size: 8,
            loads: Cell::new(0),
        }
    }
}

impl DatasetProvider<B> for FakeProvider {
    type Batches = std::vec::IntoIter<DatasetResult<SegBatch<B>>>;

    fn load(&self, split: Split, device: &<B as Backend>::Device) -> DatasetResult<Self::Batches> {
        self.loads.set(self.loads.get() + 1);
        let n = match split {
            Split::Train => self.train,
            Split::Valid => self.valid,
            Split::Test => 0,
        };
        let shape = [self.batch, 1, self.size, self.size];
        let batches: Vec<_> = (0..n)
            .map(|_| {
                Ok(SegBatch {
                    images: Tensor::zeros([self.batch, 3, self.size, self.size], device),
                    masks: Tensor::zeros(shape, device),
                })
            })
            .collect();
        Ok(batches.into_iter())
    }
}

/// Reports a different loss for every step so last-batch reporting is observable.
#[derive(Default)]
pub struct CountingModel {
    pub train_steps: usize,
    pub test_steps: Cell<usize>,
    pub saves: Cell<usize>,
}

impl SegmentationModel<B> for CountingModel {
    fn train_step(&mut self, _batch: &SegBatch<B>, _gclip: f32) -> anyhow::Result<StepMetrics> {
        self.train_steps += 1;
        let n = self.train_steps as f32;
        Ok(StepMetrics {
            loss: n,
            dice: n / 10.0,
            iou: n / 100.0,
        })
    }

    fn test_step(&self, _batch: &SegBatch<B>) -> anyhow::Result<StepMetrics> {
        self.test_steps.set(self.test_steps.get() + 1);
        let n = self.test_steps.get() as f32;
        Ok(StepMetrics {
            loss: 100.0 + n,
            dice: n / 10.0,
            iou: n / 100.0,
        })
    }

    fn forward(&self, images: Tensor<B, 4>) -> SideOutputs<B> {
        let [n, _, h, w] = images.dims();
        let map = Tensor::zeros([n, 1, h, w], &images.device());
        SideOutputs {
            global: map.clone(),
            side4: map.clone(),
            side3: map.clone(),
            side2: map,
        }
    }

    fn save(&self, dir: &Path) -> anyhow::Result<()> {
        self.saves.set(self.saves.get() + 1);
        std::fs::create_dir_all(dir)?;
        Ok(())
    }
}
