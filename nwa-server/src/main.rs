use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use nwa_server::{
    cli::{Cli, Command, ServeArgs},
    client,
    emulator::GameInfo,
    headless::HeadlessEmulator,
    server::NwaServer,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Query(args) => client::run(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let emulator = HeadlessEmulator::snes();
    if let Some(path) = &args.rom {
        let rom = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(file = %file, bytes = rom.len(), "loaded cartridge");
        emulator.load_game(GameInfo::from_file(file), rom);
    }

    let mut server = NwaServer::new(Arc::new(emulator), args.server_config());
    server.start().await?;

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = ?err, "failed to install ctrl-c handler");
    }
    server.stop().await;
    Ok(())
}
