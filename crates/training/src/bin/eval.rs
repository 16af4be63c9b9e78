use clap::Parser;
use training::cli::EvalArgs;
use training::{run_test, ExecutionContext, TrainBackend};

fn main() -> anyhow::Result<()> {
    let args = EvalArgs::parse();
    cli_support::init_tracing(args.common.verbose);
    cli_support::validate_backend_choice(args.common.backend)?;

    let cfg = args.resolve()?;
    let ctx = ExecutionContext::<TrainBackend>::with_default_device(cfg.seed);
    run_test(&ctx, &cfg)?;
    Ok(())
}
