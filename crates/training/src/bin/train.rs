use clap::Parser;
use training::cli::TrainArgs;
use training::{run_train, AutodiffTrainBackend, ExecutionContext};

fn main() -> anyhow::Result<()> {
    let args = TrainArgs::parse();
    cli_support::init_tracing(args.common.verbose);
    cli_support::validate_backend_choice(args.common.backend)?;

    let cfg = args.resolve()?;
    let ctx = ExecutionContext::<AutodiffTrainBackend>::with_default_device(cfg.seed);
    let records = run_train(&ctx, &cfg)?;
    if let Some(last) = records.last() {
        tracing::info!(
            epochs = records.len(),
            val_dice = last.val_dice,
            val_iou = last.val_iou,
            "training finished"
        );
    }
    Ok(())
}
