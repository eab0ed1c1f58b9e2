use std::{io::IsTerminal, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{io::BufReader, net::TcpListener};
use tracing::{error, info, warn};

use stream_fanout::{
    broadcaster::Broadcaster,
    cli::Cli,
    registry::Registry,
    server::Server,
    source::{Input, open_input, pump_lines},
};

fn init_tracing(debug: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result = runtime.block_on(run(cli));
    // A blocked stdin read cannot be cancelled; don't wait for it.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let input = open_input(cli.input_path()).await?;

    let addr = cli.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;

    let registry = Arc::new(Registry::new(cli.capacity));
    let server = Server::new(listener, Arc::clone(&registry));
    info!("listening on {}", server.local_addr()?);

    tokio::spawn(read_input(input, Broadcaster::new(registry)));

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("server exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}

async fn read_input(input: Input, broadcaster: Broadcaster) {
    match pump_lines(BufReader::new(input), &broadcaster).await {
        Ok(stats) => info!(
            lines = stats.lines,
            bytes = stats.bytes,
            "input exhausted, no further lines will be sent"
        ),
        Err(err) => error!(error = ?err, "failed to read input, no further lines will be sent"),
    }
}
