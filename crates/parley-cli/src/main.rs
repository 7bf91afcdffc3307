use anyhow::Result;
use clap::Parser;

use parley_cli::{app, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = parley_core::Settings::load();
    if let Some(ref dir) = cli.data_dir {
        settings.storage.data_dir = dir.clone();
    }

    app::run(cli, settings).await
}
