use clap::Parser as _;
use specgate_gateway::config::{Cli, GatewayConfig};
use specgate_gateway::mcp::{self, McpState};
use specgate_gateway::session::SessionRegistry;
use specgate_gateway::source;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long in-flight sessions may drain after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match GatewayConfig::load(&cli) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    // Fail fast on unloadable specs: compile once with no session headers.
    // Sessions still compile their own registries (the spec may depend on
    // per-session credentials).
    let probe = source::build_source(&config);
    if let Err(e) = probe.start(&[]).await {
        tracing::error!(error = %e.message, "spec failed to load at startup");
        return ExitCode::FAILURE;
    }
    drop(probe);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Arc<GatewayConfig>) -> anyhow::Result<()> {
    let sessions = Arc::new(SessionRegistry::new());
    let state = McpState {
        config: config.clone(),
        sessions: sessions.clone(),
    };
    let app = mcp::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "gateway listening");

    let shutdown = CancellationToken::new();
    let server_token = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    shutdown_signal().await;
    tracing::info!(open_sessions = sessions.len(), "shutdown signal received; draining");
    sessions.shutdown_all();
    shutdown.cancel();

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!("grace period elapsed; forcing shutdown"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
