mod common;

use common::{tiny_train_config, CountingModel, FakeProvider, RecordingSink, B};
use models::BackboneArch;
use std::cell::Cell;
use training::{
    run, run_test, run_train, train_with, ExecutionContext, PreconditionError, TestConfig,
    VisualizeConfig,
};

fn precondition(err: &anyhow::Error) -> Option<&PreconditionError> {
    err.downcast_ref::<PreconditionError>()
}

#[test]
fn training_without_dataset_dir_builds_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tiny_train_config(tmp.path());
    let ctx = ExecutionContext::<B>::with_default_device(0);
    let provider = FakeProvider::new(2, 1);
    let built = Cell::new(false);
    let (mut train, mut val) = (RecordingSink::default(), RecordingSink::default());

    let err = train_with(
        &ctx,
        &cfg,
        &provider,
        |_, _| {
            built.set(true);
            Ok(CountingModel::default())
        },
        &mut train,
        &mut val,
    )
    .unwrap_err();

    assert!(matches!(precondition(&err), Some(PreconditionError::MissingDatasetDir(_))));
    assert!(!built.get());
    assert_eq!(provider.loads.get(), 0);
    assert!(train.scalars.is_empty());
}

#[test]
fn run_train_stops_before_touching_the_filesystem() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tiny_train_config(tmp.path());
    let ctx = ExecutionContext::<burn::backend::Autodiff<B>>::with_default_device(0);
    let err = run_train(&ctx, &cfg).unwrap_err();
    assert!(matches!(precondition(&err), Some(PreconditionError::MissingDatasetDir(_))));
    assert!(!cfg.trained_model_dir.exists());
    assert!(!cfg.logdir.exists());
}

#[test]
fn mobilenet_at_256_stops_before_the_model_is_built() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = tiny_train_config(tmp.path());
    std::fs::create_dir_all(&cfg.dataset_dir).unwrap();
    cfg.backbone_arc = BackboneArch::Mobilenetv2;
    cfg.img_size = 256;

    let ctx = ExecutionContext::<B>::with_default_device(0);
    let provider = FakeProvider::new(2, 1);
    let built = Cell::new(false);
    let (mut train, mut val) = (RecordingSink::default(), RecordingSink::default());
    let err = train_with(
        &ctx,
        &cfg,
        &provider,
        |_, _| {
            built.set(true);
            Ok(CountingModel::default())
        },
        &mut train,
        &mut val,
    )
    .unwrap_err();

    assert!(matches!(
        precondition(&err),
        Some(PreconditionError::BackboneInputSize { img_size: 256, .. })
    ));
    assert!(!built.get());
}

#[test]
fn epoch_reports_the_last_batch_not_the_average() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = tiny_train_config(tmp.path());
    std::fs::create_dir_all(&cfg.dataset_dir).unwrap();
    cfg.epochs = 2;
    cfg.checkpoint_every = 2;
    cfg.metrics_out = Some(tmp.path().join("metrics.jsonl"));

    let ctx = ExecutionContext::<B>::with_default_device(0);
    let provider = FakeProvider::new(3, 2);
    let (mut train, mut val) = (RecordingSink::default(), RecordingSink::default());
    let records = train_with(
        &ctx,
        &cfg,
        &provider,
        |_, _| Ok(CountingModel::default()),
        &mut train,
        &mut val,
    )
    .unwrap();

    // Per-batch train losses are 1, 2, 3 in epoch 1 and 4, 5, 6 in epoch 2.
    assert_eq!(train.scalar_at("train_loss", 1), Some(3.0));
    assert_eq!(train.scalar_at("train_loss", 2), Some(6.0));
    assert_eq!(train.scalar_at("dice", 1), Some(0.3));
    assert_eq!(val.scalar_at("val_loss", 1), Some(102.0));
    assert_eq!(val.scalar_at("val_loss", 2), Some(104.0));
    assert_eq!(val.scalar_at("val_iou", 2), Some(0.04));
    assert_eq!(records[0].train_loss, 3.0);

    for tag in ["Y_mask", "Global S Map", "S4 Map", "S3 Map", "S2 Map"] {
        assert!(val.images.contains(&(tag.to_string(), 2, 1)), "missing {tag}");
    }
    assert!(train.flushes >= 2);

    assert!(records[0].checkpoint.is_none());
    let ckpt = records[1].checkpoint.clone().unwrap();
    assert!(ckpt.ends_with("pranet_resnet50"));

    let lines = std::fs::read_to_string(tmp.path().join("metrics.jsonl")).unwrap();
    assert_eq!(lines.lines().count(), 2);
}

#[test]
fn empty_validation_split_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = tiny_train_config(tmp.path());
    std::fs::create_dir_all(&cfg.dataset_dir).unwrap();
    let ctx = ExecutionContext::<B>::with_default_device(0);
    let (mut train, mut val) = (RecordingSink::default(), RecordingSink::default());
    let result = train_with(
        &ctx,
        &cfg,
        &FakeProvider::new(1, 0),
        |_, _| Ok(CountingModel::default()),
        &mut train,
        &mut val,
    );
    assert!(result.is_err());
}

#[test]
fn evaluation_checks_paths_before_loading() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ExecutionContext::<B>::with_default_device(0);

    let missing_model = TestConfig {
        model_path: tmp.path().join("nope"),
        dataset_path: tmp.path().to_path_buf(),
        ..TestConfig::default()
    };
    let err = run_test(&ctx, &missing_model).unwrap_err();
    assert!(matches!(precondition(&err), Some(PreconditionError::MissingModelPath(_))));

    // The model dir exists but holds no checkpoint; the dataset check must fire first.
    let missing_data = TestConfig {
        model_path: tmp.path().to_path_buf(),
        dataset_path: tmp.path().join("no_data"),
        ..TestConfig::default()
    };
    let err = run_test(&ctx, &missing_data).unwrap_err();
    assert!(matches!(precondition(&err), Some(PreconditionError::MissingDatasetPath(_))));

    let bad_threshold = TestConfig {
        model_path: tmp.path().to_path_buf(),
        dataset_path: tmp.path().to_path_buf(),
        threshold: 1.5,
        ..TestConfig::default()
    };
    let err = run_test(&ctx, &bad_threshold).unwrap_err();
    assert!(matches!(precondition(&err), Some(PreconditionError::ThresholdOutOfRange(_))));
}

#[test]
fn export_checks_paths_before_loading() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = ExecutionContext::<B>::with_default_device(0);
    let cfg = VisualizeConfig {
        model_path: tmp.path().to_path_buf(),
        dataset_path: tmp.path().join("no_data"),
        results_dir: tmp.path().join("results"),
        ..VisualizeConfig::default()
    };
    let err = run(&ctx, &cfg).unwrap_err();
    assert!(matches!(precondition(&err), Some(PreconditionError::MissingDatasetPath(_))));
    assert!(!cfg.results_dir.exists());
}
