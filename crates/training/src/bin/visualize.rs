use clap::Parser;
use training::cli::VisualizeArgs;
use training::{run, ExecutionContext, TrainBackend};

fn main() -> anyhow::Result<()> {
    let args = VisualizeArgs::parse();
    cli_support::init_tracing(args.common.verbose);
    cli_support::validate_backend_choice(args.common.backend)?;

    let cfg = args.resolve()?;
    let ctx = ExecutionContext::<TrainBackend>::with_default_device(cfg.seed.unwrap_or_else(rand::random));
    let records = run(&ctx, &cfg)?;
    tracing::info!(count = records.len(), dir = %cfg.results_dir.display(), "export finished");
    Ok(())
}
