//! Weighted F-beta (Margolin, Zelnik-Manor and Tal, "How to evaluate foreground maps").

use crate::map::{check_shapes, MetricResult, SegMap};

const BETA_SQ: f64 = 1.0;
const KERNEL_RADIUS: usize = 3;
const KERNEL_SIGMA: f64 = 5.0;

/// 1-D squared distance transform (Felzenszwalb and Huttenlocher) over the
/// finite entries of `f`. Returns false, leaving `d` infinite, when there are none.
fn dt_1d(f: &[f64], d: &mut [f64], arg: &mut [usize]) -> bool {
    let mut v: Vec<usize> = Vec::new();
    let mut z: Vec<f64> = Vec::new();
    for (q, fq) in f.iter().enumerate() {
        if !fq.is_finite() {
            continue;
        }
        let mut s = f64::NEG_INFINITY;
        while let Some(&p) = v.last() {
            let cand = ((fq + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * (q - p) as f64);
            if z.last().is_some_and(|zk| cand <= *zk) {
                v.pop();
                z.pop();
            } else {
                s = cand;
                break;
            }
        }
        v.push(q);
        z.push(s);
    }
    if v.is_empty() {
        d.fill(f64::INFINITY);
        return false;
    }
    let mut k = 0;
    for q in 0..f.len() {
        while k + 1 < v.len() && z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let dq = q as f64 - p as f64;
        d[q] = dq * dq + f[p];
        arg[q] = p;
    }
    true
}

/// Euclidean distance from every pixel to the nearest foreground pixel, and the
/// flat index of that pixel. `None` when there is no foreground.
pub(crate) fn nearest_foreground(
    fg: &[bool],
    width: usize,
    height: usize,
) -> Option<(Vec<f64>, Vec<usize>)> {
    if !fg.iter().any(|v| *v) {
        return None;
    }
    let n = width * height;
    let mut col_d = vec![f64::INFINITY; n];
    let mut col_arg = vec![0usize; n];

    let mut f = vec![0.0; height];
    let mut d = vec![0.0; height];
    let mut arg = vec![0usize; height];
    for x in 0..width {
        for y in 0..height {
            f[y] = if fg[y * width + x] { 0.0 } else { f64::INFINITY };
        }
        if dt_1d(&f, &mut d, &mut arg) {
            for y in 0..height {
                col_d[y * width + x] = d[y];
                col_arg[y * width + x] = arg[y];
            }
        }
    }

    let mut dist = vec![0.0; n];
    let mut nearest = vec![0usize; n];
    let mut d = vec![0.0; width];
    let mut arg = vec![0usize; width];
    for y in 0..height {
        let row = &col_d[y * width..(y + 1) * width];
        // Every row has a finite entry once any column holds foreground.
        dt_1d(row, &mut d, &mut arg);
        for x in 0..width {
            let ax = arg[x];
            let ay = col_arg[y * width + ax];
            dist[y * width + x] = d[x].sqrt();
            nearest[y * width + x] = ay * width + ax;
        }
    }
    Some((dist, nearest))
}

fn gaussian_kernel() -> Vec<f64> {
    let size = 2 * KERNEL_RADIUS + 1;
    let r = KERNEL_RADIUS as f64;
    let mut k = Vec::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let (dx, dy) = (x as f64 - r, y as f64 - r);
            k.push((-(dx * dx + dy * dy) / (2.0 * KERNEL_SIGMA * KERNEL_SIGMA)).exp());
        }
    }
    let sum: f64 = k.iter().sum();
    k.iter_mut().for_each(|v| *v /= sum);
    k
}

/// Zero-padded 2-D filter with a symmetric kernel.
fn filter(src: &[f64], width: usize, height: usize, kernel: &[f64]) -> Vec<f64> {
    let size = 2 * KERNEL_RADIUS + 1;
    let r = KERNEL_RADIUS as isize;
    let mut out = vec![0.0; src.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for ky in 0..size {
                let sy = y as isize + ky as isize - r;
                if sy < 0 || sy >= height as isize {
                    continue;
                }
                for kx in 0..size {
                    let sx = x as isize + kx as isize - r;
                    if sx < 0 || sx >= width as isize {
                        continue;
                    }
                    acc += kernel[ky * size + kx] * src[sy as usize * width + sx as usize];
                }
            }
            out[y * width + x] = acc;
        }
    }
    out
}

pub fn weighted_fbeta(gt: &SegMap, pred: &SegMap) -> MetricResult<f64> {
    check_shapes(gt, pred)?;
    let (width, height) = (gt.width(), gt.height());
    let fg = gt.foreground();
    let Some((dist, nearest)) = nearest_foreground(&fg, width, height) else {
        return Ok(0.0);
    };
    let pred = pred.values();

    let err: Vec<f64> = pred
        .iter()
        .zip(&fg)
        .map(|(p, g)| (p - if *g { 1.0 } else { 0.0 }).abs())
        .collect();
    // Background pixels inherit the error of their nearest foreground pixel.
    let propagated: Vec<f64> = (0..err.len())
        .map(|i| if fg[i] { err[i] } else { err[nearest[i]] })
        .collect();
    let smoothed = filter(&propagated, width, height, &gaussian_kernel());

    let decay = 0.5f64.ln() / 5.0;
    let mut fg_count = 0.0;
    let mut fg_weighted = 0.0;
    let mut bg_weighted = 0.0;
    for i in 0..err.len() {
        let e = if fg[i] && smoothed[i] < err[i] {
            smoothed[i]
        } else {
            err[i]
        };
        if fg[i] {
            fg_count += 1.0;
            fg_weighted += e;
        } else {
            bg_weighted += e * (2.0 - (decay * dist[i]).exp());
        }
    }

    let tp = fg_count - fg_weighted;
    let recall = 1.0 - fg_weighted / fg_count;
    let precision = tp / (tp + bg_weighted + f64::EPSILON);
    Ok((1.0 + BETA_SQ) * recall * precision / (recall + BETA_SQ * precision + f64::EPSILON))
}
