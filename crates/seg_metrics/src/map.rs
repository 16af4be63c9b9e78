use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use thiserror::Error;

pub type MetricResult<T> = Result<T, MetricError>;

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("shape mismatch: ground truth is {gt:?}, prediction is {pred:?}")]
    ShapeMismatch {
        gt: (usize, usize),
        pred: (usize, usize),
    },
    #[error("buffer of {len} values cannot hold a {width}x{height} map")]
    BufferSize {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("cannot score an empty map")]
    Empty,
    #[error("failed to read tensor data: {0}")]
    TensorRead(String),
}

/// A single-channel map in row-major order, values nominally in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct SegMap {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl SegMap {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> MetricResult<Self> {
        if data.len() != width * height {
            return Err(MetricError::BufferSize {
                width,
                height,
                len: data.len(),
            });
        }
        if data.is_empty() {
            return Err(MetricError::Empty);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(width: usize, height: usize, value: f32) -> MetricResult<Self> {
        Self::new(width, height, vec![value; width * height])
    }

    /// Copies an `[H, W]` tensor to the host.
    pub fn from_tensor<B: Backend>(tensor: Tensor<B, 2>) -> MetricResult<Self> {
        let [height, width] = tensor.dims();
        let data = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| MetricError::TensorRead(format!("{e:?}")))?;
        Self::new(width, height, data)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn mean(&self) -> f64 {
        self.data.iter().map(|v| *v as f64).sum::<f64>() / self.data.len() as f64
    }

    /// Foreground mask at `> 0.5`.
    pub fn foreground(&self) -> Vec<bool> {
        self.data.iter().map(|v| *v > 0.5).collect()
    }

    pub(crate) fn values(&self) -> Vec<f64> {
        self.data.iter().map(|v| (*v as f64).clamp(0.0, 1.0)).collect()
    }
}

pub(crate) fn check_shapes(gt: &SegMap, pred: &SegMap) -> MetricResult<()> {
    if gt.width != pred.width || gt.height != pred.height {
        return Err(MetricError::ShapeMismatch {
            gt: (gt.height, gt.width),
            pred: (pred.height, pred.width),
        });
    }
    Ok(())
}
