//! Structure measure (Fan et al., ICCV 2017) and enhanced-alignment measure
//! (Fan et al., IJCAI 2018).

use crate::map::{check_shapes, MetricResult, SegMap};

const ALPHA: f64 = 0.5;
const EPS: f64 = f64::EPSILON;

fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64, usize) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 0.0, 0);
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    let var = if n > 1 {
        values.map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    (mean, var.sqrt(), n)
}

fn s_object(pred: &[f64], mask: &[bool]) -> f64 {
    let selected = pred.iter().zip(mask).filter(|(_, m)| **m).map(|(p, _)| *p);
    let (x, sigma, n) = mean_std(selected);
    if n == 0 {
        return 0.0;
    }
    2.0 * x / (x * x + 1.0 + sigma + EPS)
}

fn object_score(pred: &[f64], fg: &[bool]) -> f64 {
    let u = fg.iter().filter(|v| **v).count() as f64 / fg.len() as f64;
    let fg_pred: Vec<f64> = pred
        .iter()
        .zip(fg)
        .map(|(p, g)| if *g { *p } else { 0.0 })
        .collect();
    let bg_pred: Vec<f64> = pred
        .iter()
        .zip(fg)
        .map(|(p, g)| if *g { 0.0 } else { 1.0 - p })
        .collect();
    let bg: Vec<bool> = fg.iter().map(|v| !v).collect();
    u * s_object(&fg_pred, fg) + (1.0 - u) * s_object(&bg_pred, &bg)
}

/// Centroid of the foreground as 1-based split coordinates; image centre when empty.
fn centroid(fg: &[bool], width: usize, height: usize) -> (usize, usize) {
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut n = 0.0;
    for (i, _) in fg.iter().enumerate().filter(|(_, v)| **v) {
        sx += (i % width) as f64;
        sy += (i / width) as f64;
        n += 1.0;
    }
    if n == 0.0 {
        return ((width as f64 / 2.0).round() as usize, (height as f64 / 2.0).round() as usize);
    }
    ((sx / n).round() as usize + 1, (sy / n).round() as usize + 1)
}

fn ssim(pred: &[f64], gt: &[f64]) -> f64 {
    let n = pred.len();
    if n == 0 {
        return 0.0;
    }
    let x = pred.iter().sum::<f64>() / n as f64;
    let y = gt.iter().sum::<f64>() / n as f64;
    let denom = n.saturating_sub(1).max(1) as f64;
    let sigma_x = pred.iter().map(|p| (p - x).powi(2)).sum::<f64>() / denom;
    let sigma_y = gt.iter().map(|g| (g - y).powi(2)).sum::<f64>() / denom;
    let sigma_xy = pred
        .iter()
        .zip(gt)
        .map(|(p, g)| (p - x) * (g - y))
        .sum::<f64>()
        / denom;
    let alpha = 4.0 * x * y * sigma_xy;
    let beta = (x * x + y * y) * (sigma_x + sigma_y);
    if alpha != 0.0 {
        alpha / (beta + EPS)
    } else if beta == 0.0 {
        1.0
    } else {
        0.0
    }
}

fn region_score(pred: &[f64], gt: &[f64], fg: &[bool], width: usize, height: usize) -> f64 {
    let (cx, cy) = centroid(fg, width, height);
    let (cx, cy) = (cx.min(width), cy.min(height));
    let area = (width * height) as f64;
    let quadrants = [
        (0, cx, 0, cy),
        (cx, width, 0, cy),
        (0, cx, cy, height),
        (cx, width, cy, height),
    ];
    let mut score = 0.0;
    for (x0, x1, y0, y1) in quadrants {
        let weight = ((x1 - x0) * (y1 - y0)) as f64 / area;
        if weight == 0.0 {
            continue;
        }
        let mut p = Vec::with_capacity((x1 - x0) * (y1 - y0));
        let mut g = Vec::with_capacity(p.capacity());
        for y in y0..y1 {
            for x in x0..x1 {
                p.push(pred[y * width + x]);
                g.push(gt[y * width + x]);
            }
        }
        score += weight * ssim(&p, &g);
    }
    score
}

pub fn s_measure(gt: &SegMap, pred: &SegMap) -> MetricResult<f64> {
    check_shapes(gt, pred)?;
    let fg = gt.foreground();
    let gt_vals: Vec<f64> = fg.iter().map(|v| if *v { 1.0 } else { 0.0 }).collect();
    let pred_vals = pred.values();
    let y = gt_vals.iter().sum::<f64>() / gt_vals.len() as f64;
    let pred_mean = pred_vals.iter().sum::<f64>() / pred_vals.len() as f64;

    if y == 0.0 {
        return Ok(1.0 - pred_mean);
    }
    if y == 1.0 {
        return Ok(pred_mean);
    }
    let score = ALPHA * object_score(&pred_vals, &fg)
        + (1.0 - ALPHA) * region_score(&pred_vals, &gt_vals, &fg, gt.width(), gt.height());
    Ok(score.max(0.0))
}

pub fn e_measure(gt: &SegMap, pred: &SegMap) -> MetricResult<f64> {
    check_shapes(gt, pred)?;
    let fg = gt.foreground();
    let pred_vals = pred.values();
    let n = fg.len() as f64;
    let gt_fg = fg.iter().filter(|v| **v).count() as f64;

    let enhanced_sum = if gt_fg == 0.0 {
        pred_vals.iter().map(|p| 1.0 - p).sum::<f64>()
    } else if gt_fg == n {
        pred_vals.iter().sum::<f64>()
    } else {
        let mean_pred = pred_vals.iter().sum::<f64>() / n;
        let mean_gt = gt_fg / n;
        pred_vals
            .iter()
            .zip(&fg)
            .map(|(p, g)| {
                let dp = p - mean_pred;
                let dg = if *g { 1.0 } else { 0.0 } - mean_gt;
                let align = 2.0 * dp * dg / (dp * dp + dg * dg + EPS);
                (align + 1.0).powi(2) / 4.0
            })
            .sum::<f64>()
    };
    Ok(enhanced_sum / (n - 1.0 + EPS))
}
