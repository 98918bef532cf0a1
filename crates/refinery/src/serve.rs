use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::app::App;
use crate::config::ProjectConfig;
use crate::rate_limit::RateLimiter;

pub async fn handle_serve_command(app: &App, config: &ProjectConfig, port: u16) -> Result<()> {
    let (max_requests, window) = config.rate_limit();
    let state = AppState {
        engine: app.engine.clone(),
        service: app.service()?,
        prompts: app.prompt_service()?,
        limiter: Arc::new(RateLimiter::new(max_requests, window)),
    };
    let router = api::create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server to {}", addr))?;

    eprintln!();
    eprintln!(
        "  {} {}",
        "->".bright_green(),
        format!("API listening on http://localhost:{}", port).bold()
    );
    eprintln!("  {} Press {} to stop", "->".dimmed(), "Ctrl+C".bold());
    eprintln!();
    info!(port, max_requests, window_secs = window.as_secs(), "API server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    eprintln!("\nShutting down...");
}
