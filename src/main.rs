use aging_queue::app;
use aging_queue::utils::logger;
use aging_queue::{CliConfig, QueueConfig};
use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    logger::init_cli_logger(cli.verbose);
    tracing::debug!("CLI config: {:?}", cli);

    let config = if Path::new(&cli.config).exists() {
        tracing::info!("📁 Loading configuration from: {}", cli.config);
        QueueConfig::from_file(&cli.config)
            .with_context(|| format!("failed to load config file '{}'", cli.config))?
    } else {
        tracing::info!("No config at {}, using the demo services", cli.config);
        QueueConfig::with_demo_services()
    };

    if let Err(e) = config.validate_for_cli() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let data_dir = cli
        .data_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.data_dir());
    let (engine, inbox) = app::build_file_engine(&config, &data_dir).await?;

    match app::execute(&engine, &inbox, cli.command).await {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => {
            tracing::error!("❌ Command failed: {} (Category: {:?})", e, e.category());
            eprintln!("❌ {}", e.user_friendly_message());
            let exit_code = if e.is_recoverable() { 2 } else { 1 };
            std::process::exit(exit_code);
        }
    }
}
