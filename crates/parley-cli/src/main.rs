//! `parley` entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_cli::Cli;

/// Targets raised to `debug` by `--verbose`.
const VERBOSE_FILTER: &str = "warn,parley=debug,parley_cli=debug,parley_core=debug,parley_voice=debug";

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    // RUST_LOG wins over the flag.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_FILTER } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables before clap reads PARLEY_*
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    if let Err(e) = parley_cli::run(&cli).await {
        eprintln!("parley: {e}");
        std::process::exit(e.exit_code());
    }
    Ok(())
}
