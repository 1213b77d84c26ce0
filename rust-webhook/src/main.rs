//! DevQuest webhook server - receives inbound support emails.
//!
//! This binary:
//! - Verifies the provider's HMAC signature on every delivery
//! - Drops redeliveries it has already persisted
//! - Opens a support ticket or appends a reply through the ticket store

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};

use devquest::{
    router, telemetry, AppState, Config, HttpTicketStore, MemorySeenTokens, MemoryTicketStore,
    SignaturePolicy, TicketStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init("info,tower_http=debug");
    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        signing_key_configured = config.webhook_signing_key.is_some(),
        permissive_mode = config.permissive_mode,
        tolerance_seconds = config.signature_tolerance_seconds,
        support_inbox_domain = ?config.support_inbox_domain,
        ticket_store_configured = config.ticket_store_url.is_some(),
        "config_loaded"
    );

    match config.signature_policy() {
        SignaturePolicy::Verify { .. } => info!("signature_verification_enabled"),
        SignaturePolicy::RejectUnsigned => {
            warn!("signing_key_missing_all_deliveries_will_be_rejected")
        }
        SignaturePolicy::AcceptUnsigned => {
            warn!("permissive_mode_unsigned_deliveries_accepted")
        }
    }

    // Ticket store and outbound client are built once, here
    let tickets: Arc<dyn TicketStore> = match &config.ticket_store_url {
        Some(url) => {
            let store = HttpTicketStore::new(
                url,
                config.ticket_store_token.clone(),
                Duration::from_millis(config.request_timeout_ms),
            )?;
            info!("ticket_store_http");
            Arc::new(store)
        }
        None => {
            warn!("ticket_store_in_memory");
            Arc::new(MemoryTicketStore::new())
        }
    };

    let seen_tokens = Arc::new(MemorySeenTokens::new(
        Duration::from_secs(config.replay_ttl_seconds()),
        config.replay_max_entries,
    ));

    let port = config.port;
    let state = AppState::new(config, tickets, seen_tokens);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
///
/// A handler that fails to install is logged and never fires, so the other
/// signal still stops the server.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "sigint_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    info!(signal = received, "web_server_shutting_down");
}
