use clap::Parser;
use spa_server::config::{AppState, Config};
use spa_server::version::{self, VersionInfo};
use spa_server::{logger, server};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "spa-server")]
#[command(about = "Static file server for single page applications", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Configuration file, with or without extension
    #[arg(short, long, default_value = "config")]
    config: String,

    /// Print version information as JSON and exit
    #[arg(short = 'V', long)]
    version: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.version {
        version::print(&mut std::io::stdout().lock())?;
        return Ok(());
    }

    let cfg = Config::load_validated(&cli.config)?;
    logger::init(&cfg)?;
    logger::log_version(&VersionInfo::current());

    // Tokio runtime, sized by `server.workers` when set
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers.max(1));
    }
    let runtime = runtime_builder.build()?;

    let state = Arc::new(AppState::new(cfg));
    runtime.block_on(async move {
        // Use LocalSet for spawn_local support
        let local = tokio::task::LocalSet::new();
        local.run_until(server::run(state)).await
    })?;

    Ok(())
}
