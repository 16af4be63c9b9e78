//! Batch iteration for training, validation and test.

use crate::aug::AugmentConfig;
use crate::index::index_pairs;
use crate::sample::load_pair;
use crate::split::{split_pairs, DatasetSplits, Split, SplitManifest};
use crate::types::{DatasetError, DatasetResult, LoadedSample, SamplePair};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cell::Cell;
use std::path::PathBuf;

/// Images `[N, 3, S, S]` in [0, 1] and binary masks `[N, 1, S, S]`.
#[derive(Debug, Clone)]
pub struct SegBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub masks: Tensor<B, 4>,
}

impl<B: Backend> SegBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn from_samples(samples: &[LoadedSample], device: &B::Device) -> DatasetResult<Self> {
        let Some(first) = samples.first() else {
            return Err(DatasetError::Other("cannot build an empty batch".into()));
        };
        let size = first.size as usize;
        let plane = size * size;
        let mut images = Vec::with_capacity(samples.len() * plane * 3);
        let mut masks = Vec::with_capacity(samples.len() * plane);
        for sample in samples {
            if sample.image_chw.len() != plane * 3 || sample.mask.len() != plane {
                return Err(DatasetError::Other(format!(
                    "sample size mismatch: expected {size}x{size}"
                )));
            }
            images.extend_from_slice(&sample.image_chw);
            masks.extend_from_slice(&sample.mask);
        }
        let n = samples.len();
        Ok(Self {
            images: Tensor::from_data(TensorData::new(images, [n, 3, size, size]), device),
            masks: Tensor::from_data(TensorData::new(masks, [n, 1, size, size]), device),
        })
    }
}

/// Anything that can hand out batches for a split. The orchestrators only see this.
pub trait DatasetProvider<B: Backend> {
    type Batches: Iterator<Item = DatasetResult<SegBatch<B>>>;

    fn load(&self, split: Split, device: &B::Device) -> DatasetResult<Self::Batches>;

    /// Batches `load(split)` will yield, when known up front.
    fn batch_count(&self, _split: Split) -> Option<usize> {
        None
    }
}

pub struct BatchIter<B: Backend> {
    pairs: Vec<SamplePair>,
    cursor: usize,
    batch_size: usize,
    img_size: u32,
    augment: AugmentConfig,
    rng: StdRng,
    device: B::Device,
}

impl<B: Backend> BatchIter<B> {
    pub fn new(
        pairs: Vec<SamplePair>,
        batch_size: usize,
        img_size: u32,
        augment: AugmentConfig,
        rng: StdRng,
        device: B::Device,
    ) -> Self {
        Self {
            pairs,
            cursor: 0,
            batch_size: batch_size.max(1),
            img_size,
            augment,
            rng,
            device,
        }
    }
}

impl<B: Backend> Iterator for BatchIter<B> {
    type Item = DatasetResult<SegBatch<B>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.pairs.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.pairs.len());
        let chunk = &self.pairs[self.cursor..end];
        self.cursor = end;

        let mut samples = Vec::with_capacity(chunk.len());
        for pair in chunk {
            match load_pair(pair, self.img_size, &self.augment, &mut self.rng) {
                Ok(sample) => samples.push(sample),
                Err(e) => return Some(Err(e)),
            }
        }
        Some(SegBatch::from_samples(&samples, &self.device))
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub img_size: u32,
    pub batch_size: usize,
    /// Fraction held out for each of valid and test.
    pub split: f64,
    pub seed: u64,
    /// Applied to the training split only.
    pub augment: AugmentConfig,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>, img_size: u32, batch_size: usize, split: f64) -> Self {
        Self {
            root: root.into(),
            img_size,
            batch_size,
            split,
            seed: 41,
            augment: AugmentConfig::train_default(),
        }
    }
}

/// Directory-backed provider. Splits are fixed at construction; the train split
/// is reshuffled every time it is loaded.
#[derive(Debug)]
pub struct SegmentationPipeline {
    cfg: PipelineConfig,
    splits: DatasetSplits,
    epoch: Cell<u64>,
}

impl SegmentationPipeline {
    pub fn new(cfg: PipelineConfig) -> DatasetResult<Self> {
        let pairs = index_pairs(&cfg.root)?;
        let splits = split_pairs(pairs, cfg.split, cfg.seed)?;
        Ok(Self::from_splits(cfg, splits))
    }

    /// Uses the split a previous run recorded instead of re-splitting; `cfg.split` is ignored.
    pub fn with_manifest(cfg: PipelineConfig, manifest: &SplitManifest) -> DatasetResult<Self> {
        let pairs = index_pairs(&cfg.root)?;
        let splits = DatasetSplits::from_manifest(pairs, manifest)?;
        Ok(Self::from_splits(cfg, splits))
    }

    fn from_splits(cfg: PipelineConfig, splits: DatasetSplits) -> Self {
        tracing::info!(
            root = %cfg.root.display(),
            train = splits.train.len(),
            valid = splits.valid.len(),
            test = splits.test.len(),
            "indexed dataset"
        );
        Self {
            cfg,
            splits,
            epoch: Cell::new(0),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn splits(&self) -> &DatasetSplits {
        &self.splits
    }

    pub fn len(&self, split: Split) -> usize {
        self.splits.get(split).len()
    }

    pub fn batches_per_epoch(&self, split: Split) -> usize {
        self.len(split).div_ceil(self.cfg.batch_size.max(1))
    }

    pub fn data_loader<B: Backend>(&self, split: Split, device: &B::Device) -> BatchIter<B> {
        let mut pairs = self.splits.get(split).to_vec();
        let (augment, rng) = match split {
            Split::Train => {
                let epoch = self.epoch.get();
                self.epoch.set(epoch + 1);
                let mut rng = StdRng::seed_from_u64(self.cfg.seed.wrapping_add(epoch + 1));
                pairs.shuffle(&mut rng);
                (self.cfg.augment, rng)
            }
            Split::Valid | Split::Test => {
                (AugmentConfig::none(), StdRng::seed_from_u64(self.cfg.seed))
            }
        };
        BatchIter::new(
            pairs,
            self.cfg.batch_size,
            self.cfg.img_size,
            augment,
            rng,
            device.clone(),
        )
    }
}

impl<B: Backend> DatasetProvider<B> for SegmentationPipeline {
    type Batches = BatchIter<B>;

    fn load(&self, split: Split, device: &B::Device) -> DatasetResult<Self::Batches> {
        Ok(self.data_loader(split, device))
    }

    fn batch_count(&self, split: Split) -> Option<usize> {
        Some(self.batches_per_epoch(split))
    }
}
