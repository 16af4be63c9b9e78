#![recursion_limit = "256"]

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod learner;
pub mod loss;
pub mod postprocess;
pub mod progress;
pub mod summary;
pub mod train;
pub mod visualize;

pub use checkpoint::{checkpoint_dir, load_pranet, save_pranet};
pub use config::{RunConfig, TestConfig, TrainConfig, VisualizeConfig};
pub use context::ExecutionContext;
pub use error::PreconditionError;
pub use eval::{mean_excluding_warmup, run_test, run_test_with, test_pipeline, EvalReport, RunAggregate};
pub use learner::{PraNetLearner, Predictor, SegmentationModel, StepMetrics};
pub use loss::StructureLoss;
pub use postprocess::{postprocess_for_export, postprocess_for_logging};
pub use summary::{SummaryImage, SummarySink, TensorboardSink};
pub use train::{run_train, train_with};
pub use visualize::{compose_grid, run, run_with, unique_output_path};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type AutodiffTrainBackend = burn::backend::Autodiff<TrainBackend>;
