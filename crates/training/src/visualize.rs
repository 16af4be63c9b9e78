//! Visualization exporter: random dataset samples rendered as 2x3 prediction grids.

use crate::checkpoint::load_pranet;
use crate::config::VisualizeConfig;
use crate::context::ExecutionContext;
use crate::error::check_inference_inputs;
use crate::learner::Predictor;
use crate::postprocess::postprocess_for_export;
use anyhow::Context;
use burn::tensor::backend::Backend;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use polyp_dataset::{read_image, read_mask, select_random_images};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Row-major: `Original Image | True mask | Predicted Mask` over
/// `Global S Map | Side Map 4 | Side Map 3`.
pub const PANEL_TITLES: [&str; 6] = [
    "Original Image",
    "True mask",
    "Predicted Mask",
    "Global S Map",
    "Side Map 4",
    "Side Map 3",
];
pub const GRID_GAP: u32 = 4;
const GRID_COLUMNS: u32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    pub output: PathBuf,
    pub image: PathBuf,
    pub mask: PathBuf,
    pub runtime_ms: f64,
    pub panels: Vec<String>,
}

/// Height of the strip above each panel that carries its title.
pub fn title_band(panel_width: u32) -> u32 {
    title_font_px(panel_width) + 8
}

fn title_font_px(panel_width: u32) -> u32 {
    (panel_width / 16).clamp(10, 28)
}

/// Lays six equally sized panels out on a white canvas, `GRID_GAP` pixels apart,
/// each under its entry in `PANEL_TITLES`. Panels of another size are resized to the first one.
pub fn compose_grid(panels: &[RgbImage; 6]) -> anyhow::Result<RgbImage> {
    let (w, h) = panels[0].dimensions();
    let band = title_band(w);
    let cell_h = band + h;
    let width = GRID_COLUMNS * w + (GRID_COLUMNS - 1) * GRID_GAP;
    let height = 2 * cell_h + GRID_GAP;
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for (i, panel) in panels.iter().enumerate() {
        let (col, row) = (i as u32 % GRID_COLUMNS, i as u32 / GRID_COLUMNS);
        let x = (col * (w + GRID_GAP)) as i64;
        let y = (row * (cell_h + GRID_GAP) + band) as i64;
        if panel.dimensions() == (w, h) {
            imageops::replace(&mut canvas, panel, x, y);
        } else {
            let resized = imageops::resize(panel, w, h, FilterType::Triangle);
            imageops::replace(&mut canvas, &resized, x, y);
        }
    }
    draw_titles(&mut canvas, w, cell_h, band)?;
    Ok(canvas)
}

fn draw_titles(canvas: &mut RgbImage, w: u32, cell_h: u32, band: u32) -> anyhow::Result<()> {
    let size = canvas.dimensions();
    let root = BitMapBackend::with_buffer(canvas, size).into_drawing_area();
    let style = TextStyle::from(("sans-serif", f64::from(title_font_px(w))).into_font())
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    for (i, title) in PANEL_TITLES.iter().enumerate() {
        let (col, row) = (i as u32 % GRID_COLUMNS, i as u32 / GRID_COLUMNS);
        let cx = col * (w + GRID_GAP) + w / 2;
        let cy = row * (cell_h + GRID_GAP) + band / 2;
        root.draw_text(title, &style, (cx as i32, cy as i32))
            .map_err(|e| anyhow::anyhow!("failed to draw title {title:?}: {e}"))?;
    }
    root.present()
        .map_err(|e| anyhow::anyhow!("failed to render titles: {e}"))?;
    Ok(())
}

/// `detection_<unix_ms>_<index>.jpg`, suffixed until it names no existing file.
pub fn unique_output_path(dir: &Path, unix_ms: u128, index: usize) -> PathBuf {
    let base = format!("detection_{unix_ms}_{index}");
    let mut candidate = dir.join(format!("{base}.jpg"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{base}-{n}.jpg"));
        n += 1;
    }
    candidate
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Load the checkpoint at `cfg.model_path` and export grids for a random subset.
pub fn run<B: Backend>(
    ctx: &ExecutionContext<B>,
    cfg: &VisualizeConfig,
) -> anyhow::Result<Vec<ExportRecord>> {
    check_inference_inputs(&cfg.model_path, &cfg.dataset_path, cfg.threshold)?;
    let model = load_pranet::<B>(&cfg.model_path, &ctx.device)?;
    run_with(ctx, cfg, &model)
}

pub fn run_with<B: Backend, M: Predictor<B>>(
    ctx: &ExecutionContext<B>,
    cfg: &VisualizeConfig,
    model: &M,
) -> anyhow::Result<Vec<ExportRecord>> {
    check_inference_inputs(&cfg.model_path, &cfg.dataset_path, cfg.threshold)?;
    let mut rng = ctx.rng();
    let (images, masks) = select_random_images(&cfg.dataset_path, cfg.percentage, &mut rng)?;
    fs::create_dir_all(&cfg.results_dir)
        .with_context(|| format!("failed to create {}", cfg.results_dir.display()))?;
    tracing::info!(count = images.len(), "exporting predictions");

    let mut records = Vec::with_capacity(images.len());
    for (index, (image_path, mask_path)) in images.into_iter().zip(masks).enumerate() {
        let input = read_image(&image_path, cfg.imgsize)?;
        let mask = read_mask(&mask_path)?;
        let size = input.original.dimensions();

        let started = Instant::now();
        let outputs = model.predict(input.to_tensor::<B>(&ctx.device));
        let predicted = postprocess_for_export(outputs.side2, size, Some(cfg.threshold))?;
        let runtime_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut true_mask = DynamicImage::ImageLuma8(mask).to_rgb8();
        if true_mask.dimensions() != size {
            true_mask = imageops::resize(&true_mask, size.0, size.1, FilterType::Nearest);
        }
        let panels = [
            input.original,
            true_mask,
            predicted,
            postprocess_for_export(outputs.global, size, None)?,
            postprocess_for_export(outputs.side4, size, None)?,
            postprocess_for_export(outputs.side3, size, None)?,
        ];
        let grid = compose_grid(&panels)?;

        let output = unique_output_path(&cfg.results_dir, unix_millis(), index);
        grid.save(&output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        let record = ExportRecord {
            output: output.clone(),
            image: image_path,
            mask: mask_path,
            runtime_ms,
            panels: PANEL_TITLES.iter().map(|t| t.to_string()).collect(),
        };
        fs::write(output.with_extension("json"), serde_json::to_string_pretty(&record)?)?;
        tracing::info!(path = %output.display(), runtime_ms = format!("{runtime_ms:.2}"), "saved prediction grid");
        records.push(record);
    }
    Ok(records)
}
