mod common;

use burn::backend::Autodiff;
use common::{tiny_train_config, write_dataset, B};
use models::{PraNet, PraNetConfig};
use polyp_dataset::{PipelineConfig, SegmentationPipeline, Split};
use training::checkpoint::SPLIT_MANIFEST_FILE;
use training::{
    run, run_test, run_train, run_with, test_pipeline, ExecutionContext, TestConfig,
    VisualizeConfig,
};

#[test]
fn train_then_evaluate_then_export() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tiny_train_config(tmp.path());
    write_dataset(&cfg.dataset_dir, 12);

    let train_ctx = ExecutionContext::<Autodiff<B>>::with_default_device(cfg.seed);
    let records = run_train(&train_ctx, &cfg).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].train_loss.is_finite());

    let ckpt = cfg.trained_model_dir.join("pranet_resnet50");
    assert!(ckpt.join("model.bin").is_file());
    assert!(ckpt.join(SPLIT_MANIFEST_FILE).is_file());
    assert!(cfg.logdir.join("PRAnet").is_dir());

    // A different seed here must not change the split; the manifest decides it.
    let ctx = ExecutionContext::<B>::with_default_device(cfg.seed + 34);
    let report_out = tmp.path().join("report.json");
    let test_cfg = TestConfig {
        model_path: ckpt.clone(),
        dataset_path: cfg.dataset_dir.clone(),
        imgsize: cfg.img_size,
        dataset_split: cfg.dataset_split,
        seed: cfg.seed,
        report_out: Some(report_out.clone()),
        ..TestConfig::default()
    };
    let report = run_test(&ctx, &test_cfg).unwrap();
    // floor(12 * 0.2) test samples, all inside the warm-up window.
    assert_eq!(report.samples, 2);
    assert_eq!(report.mean_runtime_ms, None);
    assert!((0.0..=1.0).contains(&report.mean_dice));
    assert!(report_out.is_file());

    let vis_cfg = VisualizeConfig {
        model_path: ckpt,
        dataset_path: cfg.dataset_dir.clone(),
        imgsize: cfg.img_size,
        percentage: 0.25,
        results_dir: tmp.path().join("results"),
        seed: Some(3),
        ..VisualizeConfig::default()
    };
    let exported = run(&ctx, &vis_cfg).unwrap();
    assert_eq!(exported.len(), 3);
    for record in &exported {
        assert!(record.output.is_file());
        assert!(record.output.with_extension("json").is_file());
        let grid = image::open(&record.output).unwrap();
        // Panels keep the 24x20 frame size, each under its title band.
        assert_eq!(grid.width(), 3 * 24 + 2 * training::visualize::GRID_GAP);
        let band = training::visualize::title_band(24);
        assert_eq!(grid.height(), 2 * (band + 20) + training::visualize::GRID_GAP);
    }
}

#[test]
fn evaluation_reuses_the_recorded_split() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tiny_train_config(tmp.path());
    write_dataset(&cfg.dataset_dir, 12);

    let recorded = SegmentationPipeline::new(PipelineConfig {
        seed: 7,
        ..PipelineConfig::new(cfg.dataset_dir.clone(), 32, 1, 0.2)
    })
    .unwrap()
    .splits()
    .manifest(0.2, 7);
    let model_dir = tmp.path().join("model");
    recorded.save(&model_dir.join(SPLIT_MANIFEST_FILE)).unwrap();

    // Ratio and seed both disagree with the manifest, which wins.
    let test_cfg = TestConfig {
        model_path: model_dir.clone(),
        dataset_path: cfg.dataset_dir.clone(),
        imgsize: 32,
        dataset_split: 0.4,
        ..TestConfig::default()
    };
    let pipeline = test_pipeline(&test_cfg, 41).unwrap();
    assert_eq!(pipeline.splits().manifest(0.2, 7), recorded);

    std::fs::remove_file(model_dir.join(SPLIT_MANIFEST_FILE)).unwrap();
    let fresh = test_pipeline(&test_cfg, 41).unwrap();
    assert_eq!(fresh.len(Split::Test), 4);
}

#[test]
fn export_selection_follows_the_context_seed() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    write_dataset(&data, 12);
    let model = PraNet::<B>::new(
        PraNetConfig {
            img_size: 32,
            filters: 4,
            channel_divisor: 16,
            ..PraNetConfig::default()
        },
        &Default::default(),
    );
    let selected = |ctx_seed: u64, cfg_seed: u64, out: &str| {
        let cfg = VisualizeConfig {
            model_path: tmp.path().to_path_buf(),
            dataset_path: data.clone(),
            imgsize: 32,
            percentage: 0.25,
            results_dir: tmp.path().join(out),
            seed: Some(cfg_seed),
            ..VisualizeConfig::default()
        };
        let ctx = ExecutionContext::<B>::with_default_device(ctx_seed);
        run_with(&ctx, &cfg, &model)
            .unwrap()
            .into_iter()
            .map(|r| r.image)
            .collect::<Vec<_>>()
    };
    assert_eq!(selected(5, 1, "a"), selected(5, 2, "b"));
}
