mod common;

use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::tensor::{Distribution, Tensor};
use common::B;
use models::{BackboneArch, PraNet, PraNetConfig};
use polyp_dataset::SegBatch;
use training::checkpoint::{load_meta, CONFIG_FILE};
use training::{load_pranet, save_pranet, PraNetLearner, SegmentationModel};

type AB = Autodiff<B>;

fn random_batch(device: &<AB as burn::tensor::backend::Backend>::Device) -> SegBatch<AB> {
    SegBatch {
        images: Tensor::<AB, 4>::random([2, 3, 32, 32], Distribution::Default, device),
        masks: Tensor::<AB, 4>::random([2, 1, 32, 32], Distribution::Bernoulli(0.3), device),
    }
}

/// Largest absolute difference between the backbone features of two models.
fn backbone_drift(a: &PraNet<B>, b: &PraNet<B>, images: Tensor<B, 4>) -> f32 {
    let (fa, fb) = (a.encode(images.clone()), b.encode(images));
    [(fa.x1, fb.x1), (fa.x2, fb.x2), (fa.x3, fb.x3), (fa.x4, fb.x4)]
        .into_iter()
        .map(|(x, y)| (x - y).abs().max().into_scalar())
        .fold(0.0, f32::max)
}

/// Largest absolute change in the side-2 map between two models.
fn output_drift(a: &PraNet<B>, b: &PraNet<B>, images: Tensor<B, 4>) -> f32 {
    let (x, y) = (a.forward(images.clone()).side2, b.forward(images).side2);
    (x - y).abs().max().into_scalar()
}

fn tiny() -> PraNetConfig {
    PraNetConfig {
        img_size: 32,
        filters: 4,
        backbone_arch: BackboneArch::Resnet50,
        backbone_trainable: true,
        channel_divisor: 16,
    }
}

#[test]
fn reloaded_model_predicts_the_same_maps() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    let model = PraNet::<B>::new(tiny(), &device);
    save_pranet(&model, tmp.path()).unwrap();

    assert!(tmp.path().join("model.bin").is_file());
    assert_eq!(load_meta(tmp.path()).unwrap().model, tiny());

    let loaded = load_pranet::<B>(tmp.path(), &device).unwrap();
    let images = Tensor::<B, 4>::random([1, 3, 32, 32], Distribution::Default, &device);
    let before = model.forward(images.clone()).side2;
    let after = loaded.forward(images).side2;
    let diff = (before - after).abs().max().into_scalar();
    assert!(diff < 1e-5, "max diff {diff}");
}

#[test]
fn missing_weights_fail_to_load() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    std::fs::write(
        tmp.path().join(CONFIG_FILE),
        serde_json::to_string(&serde_json::json!({
            "model": tiny(),
            "saved_at": "2026-01-01T00:00:00+00:00"
        }))
        .unwrap(),
    )
    .unwrap();
    assert!(load_pranet::<B>(tmp.path(), &device).is_err());
}

#[test]
fn learner_step_updates_and_saves() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    let mut learner = PraNetLearner::new(PraNet::<AB>::new(tiny(), &device), 1e-3, 1.0);
    let batch = random_batch(&device);

    let first = learner.train_step(&batch, 1.0).unwrap();
    assert!(first.loss.is_finite());
    assert!((0.0..=1.0).contains(&first.dice));
    let eval = learner.test_step(&batch).unwrap();
    assert!(eval.loss.is_finite());

    let dir = tmp.path().join("pranet_resnet50");
    learner.save(&dir).unwrap();
    assert!(dir.join("model.bin").is_file());
    assert!(dir.join(CONFIG_FILE).is_file());
}

#[test]
fn frozen_backbone_survives_training_and_reloading() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    let frozen = PraNetConfig {
        backbone_trainable: false,
        ..tiny()
    };
    let initial = PraNet::<AB>::new(frozen, &device);
    let reference = initial.valid();
    let images = Tensor::<B, 4>::random([1, 3, 32, 32], Distribution::Default, &device);
    let batch = random_batch(&device);

    let mut learner = PraNetLearner::new(initial, 1e-2, 1.0);
    learner.train_step(&batch, 1.0).unwrap();
    learner.train_step(&batch, 1.0).unwrap();
    let first = tmp.path().join("first");
    learner.save(&first).unwrap();

    let trained = load_pranet::<B>(&first, &device).unwrap();
    assert_eq!(backbone_drift(&reference, &trained, images.clone()), 0.0);
    assert!(output_drift(&reference, &trained, images.clone()) > 0.0, "heads did not train");

    // Reloaded for further training, the backbone must still be frozen.
    let resumed = load_pranet::<AB>(&first, &device).unwrap();
    let mut learner = PraNetLearner::new(resumed, 1e-2, 1.0);
    learner.train_step(&batch, 1.0).unwrap();
    let second = tmp.path().join("second");
    learner.save(&second).unwrap();
    let retrained = load_pranet::<B>(&second, &device).unwrap();
    assert_eq!(backbone_drift(&reference, &retrained, images), 0.0);
}

#[test]
fn trainable_backbone_moves_under_training() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    let initial = PraNet::<AB>::new(tiny(), &device);
    let reference = initial.valid();
    let images = Tensor::<B, 4>::random([1, 3, 32, 32], Distribution::Default, &device);

    let mut learner = PraNetLearner::new(initial, 1e-2, 1.0);
    learner.train_step(&random_batch(&device), 1.0).unwrap();
    learner.save(tmp.path()).unwrap();
    let trained = load_pranet::<B>(tmp.path(), &device).unwrap();
    assert!(backbone_drift(&reference, &trained, images) > 0.0);
}

#[test]
fn gradient_clip_passed_to_each_step_is_applied() {
    let tmp = tempfile::tempdir().unwrap();
    let device = Default::default();
    let initial = PraNet::<AB>::new(tiny(), &device);
    let reference = initial.valid();
    let images = Tensor::<B, 4>::random([1, 3, 32, 32], Distribution::Default, &device);
    let batch = random_batch(&device);

    // Built with a loose clip; the first step asks for a far tighter one.
    let mut clipped = PraNetLearner::new(initial.clone(), 0.1, 1.0);
    let mut loose = PraNetLearner::new(initial, 0.1, 1.0);
    clipped.train_step(&batch, 1e-9).unwrap();
    loose.train_step(&batch, 1.0).unwrap();

    clipped.save(&tmp.path().join("clipped")).unwrap();
    loose.save(&tmp.path().join("loose")).unwrap();
    let clipped = load_pranet::<B>(&tmp.path().join("clipped"), &device).unwrap();
    let loose = load_pranet::<B>(&tmp.path().join("loose"), &device).unwrap();

    let clipped_drift = output_drift(&reference, &clipped, images.clone());
    let loose_drift = output_drift(&reference, &loose, images);
    assert!(loose_drift > 0.0);
    assert!(
        clipped_drift * 100.0 < loose_drift,
        "clipped {clipped_drift} vs loose {loose_drift}"
    );
}
