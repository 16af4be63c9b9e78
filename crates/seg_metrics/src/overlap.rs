//! Overlap and absolute-error metrics.

use crate::map::{check_shapes, MetricResult, SegMap};

pub const SMOOTH: f64 = 1e-6;

fn counts(gt: &SegMap, pred: &SegMap) -> (f64, f64, f64) {
    let mut inter = 0.0;
    let mut gt_sum = 0.0;
    let mut pred_sum = 0.0;
    for (g, p) in gt.values().into_iter().zip(pred.values()) {
        inter += g * p;
        gt_sum += g;
        pred_sum += p;
    }
    (inter, gt_sum, pred_sum)
}

/// `(2|A∩B| + ε) / (|A| + |B| + ε)`.
pub fn dice(gt: &SegMap, pred: &SegMap) -> MetricResult<f64> {
    check_shapes(gt, pred)?;
    let (inter, g, p) = counts(gt, pred);
    Ok((2.0 * inter + SMOOTH) / (g + p + SMOOTH))
}

/// `(|A∩B| + ε) / (|A∪B| + ε)`.
pub fn iou(gt: &SegMap, pred: &SegMap) -> MetricResult<f64> {
    check_shapes(gt, pred)?;
    let (inter, g, p) = counts(gt, pred);
    Ok((inter + SMOOTH) / (g + p - inter + SMOOTH))
}

pub fn mae(gt: &SegMap, pred: &SegMap) -> MetricResult<f64> {
    check_shapes(gt, pred)?;
    let total: f64 = gt
        .values()
        .into_iter()
        .zip(pred.values())
        .map(|(g, p)| (g - p).abs())
        .sum();
    Ok(total / gt.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(data: &[f32]) -> SegMap {
        SegMap::new(data.len(), 1, data.to_vec()).unwrap()
    }

    #[test]
    fn half_overlap() {
        let gt = map(&[1.0, 1.0, 0.0, 0.0]);
        let pred = map(&[1.0, 0.0, 1.0, 0.0]);
        assert!((dice(&gt, &pred).unwrap() - 0.5).abs() < 1e-5);
        assert!((iou(&gt, &pred).unwrap() - 1.0 / 3.0).abs() < 1e-5);
        assert!((mae(&gt, &pred).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn two_empty_maps_agree() {
        let gt = map(&[0.0; 4]);
        assert!((dice(&gt, &gt).unwrap() - 1.0).abs() < 1e-12);
        assert!((iou(&gt, &gt).unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(mae(&gt, &gt).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let gt = SegMap::filled(2, 2, 0.0).unwrap();
        let pred = SegMap::filled(4, 1, 0.0).unwrap();
        assert!(dice(&gt, &pred).is_err());
    }
}
