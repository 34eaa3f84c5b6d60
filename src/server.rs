//! Server initialization for the stdio and HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that open the
//! database, build the tool service once, and run the session reaper for the
//! lifetime of the transport.

use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};

use crate::bank::MemoryService;
use crate::config::BankConfig;
use crate::session::{CloseReason, SessionManager, Transport};
use crate::tools::ToolService;
use crate::transport::{http, stdio, Dispatcher};

/// Everything a running server shares across connections.
pub struct AppState {
    pub config: BankConfig,
    pub sessions: Arc<SessionManager>,
    pub tools: ToolService,
}

static APP_STATE: OnceLock<Arc<AppState>> = OnceLock::new();

impl AppState {
    /// Open the configured database and build the tool service.
    pub fn build(config: BankConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let bank = MemoryService::open(&db_path)
            .with_context(|| format!("failed to open memory bank at {}", db_path.display()))?;
        tracing::info!(db = %db_path.display(), "database ready");
        Ok(Self::with_bank(config, bank))
    }

    pub fn with_bank(config: BankConfig, bank: MemoryService) -> Self {
        let sessions = Arc::new(SessionManager::new(config.session.idle_timeout()));
        let tools = ToolService::new(bank, sessions.clone(), config.storage.default_branch.clone());
        Self {
            config,
            sessions,
            tools,
        }
    }

    /// The process-wide state, built on first use.
    pub fn global(config: BankConfig) -> Result<Arc<Self>> {
        if let Some(state) = APP_STATE.get() {
            return Ok(state.clone());
        }
        let state = Arc::new(Self::build(config)?);
        Ok(APP_STATE.get_or_init(|| state).clone())
    }

    fn dispatcher(&self, transport: Transport) -> Dispatcher {
        Dispatcher::new(self.tools.clone(), transport)
    }
}

/// Run whichever transport `server.transport` names.
pub async fn serve(config: BankConfig) -> Result<()> {
    match config.server.transport.as_str() {
        "http" => serve_http(config).await,
        "stdio" => serve_stdio(config).await,
        other => anyhow::bail!("unknown transport in config: {other} (expected stdio or http)"),
    }
}

/// Serve JSON-RPC over stdin/stdout until stdin closes.
pub async fn serve_stdio(config: BankConfig) -> Result<()> {
    tracing::info!("starting memory bank server on stdio");

    let state = AppState::global(config)?;
    let reaper = state.sessions.spawn_reaper(state.config.session.reap_interval());

    let result = stdio::serve_io(
        state.dispatcher(Transport::Stdio),
        tokio::io::stdin(),
        tokio::io::stdout(),
    )
    .await;

    reaper.abort();
    state.sessions.close_all(CloseReason::Shutdown).await;
    tracing::info!("stdio server shut down");
    result
}

/// Serve JSON-RPC over HTTP until ctrl-c.
pub async fn serve_http(config: BankConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting memory bank server on HTTP");

    let state = AppState::global(config)?;
    let reaper = state.sessions.spawn_reaper(state.config.session.reap_interval());
    let router = http::router(state.dispatcher(Transport::Http));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    reaper.abort();
    state.sessions.close_all(CloseReason::Shutdown).await;
    tracing::info!("HTTP server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
