use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use trade_ledger::{
    config::{Config, EventInput},
    db::init_db,
    Consumer, Ledger, LinesTransport, Repository, Transport,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("Failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let relinked = repo
        .relink_closed_cycles()
        .await
        .context("Failed to relink executions of closed cycles")?;
    if relinked > 0 {
        tracing::warn!(relinked, "Repaired trade history links left by an earlier run");
    }

    let ledger = Ledger::from_config(repo, &config);

    let transport: Box<dyn Transport> = match &config.event_input {
        EventInput::Stdin => {
            tracing::info!("Reading events from stdin");
            Box::new(LinesTransport::stdin())
        }
        EventInput::File(path) => {
            tracing::info!("Reading events from {}", path);
            Box::new(
                LinesTransport::open(path)
                    .await
                    .with_context(|| format!("Failed to open {}", path))?,
            )
        }
    };

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let mut consumer = Consumer::from_config(transport, ledger, &config);
    consumer
        .run(shutdown_token)
        .await
        .context("Failed to close transport")?;
    Ok(())
}

async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
