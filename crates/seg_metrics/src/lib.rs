//! Host-side segmentation metrics.
//!
//! Every metric takes `(ground_truth, prediction)` maps of identical shape. Ground
//! truth is binarised at 0.5; predictions are used as given, clamped to [0, 1].

pub mod fbeta;
pub mod map;
pub mod overlap;
pub mod structure;

pub use fbeta::weighted_fbeta;
pub use map::{MetricError, MetricResult, SegMap};
pub use overlap::{dice, iou, mae};
pub use structure::{e_measure, s_measure};

/// The six scores reported per evaluated sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleScores {
    pub dice: f64,
    pub iou: f64,
    pub mae: f64,
    pub weighted_fbeta: f64,
    pub s_measure: f64,
    pub e_measure: f64,
}

pub fn score_all(gt: &SegMap, pred: &SegMap) -> MetricResult<SampleScores> {
    Ok(SampleScores {
        dice: dice(gt, pred)?,
        iou: iou(gt, pred)?,
        mae: mae(gt, pred)?,
        weighted_fbeta: weighted_fbeta(gt, pred)?,
        s_measure: s_measure(gt, pred)?,
        e_measure: e_measure(gt, pred)?,
    })
}
