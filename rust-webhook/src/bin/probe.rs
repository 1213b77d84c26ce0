//! DevQuest webhook probe - posts a signed test delivery to a running server.
//!
//! Environment:
//! - `PROBE_URL`: server base URL (default `http://localhost:8080`)
//! - `WEBHOOK_SIGNING_KEY`: key to sign with; unset sends an unsigned delivery
//! - `PROBE_SENDER` / `PROBE_RECIPIENT`: addresses to use
//! - `PROBE_TICKET_ID`: when set, sends a reply to that ticket
//!
//! Exits non-zero unless the server acks with 200.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use devquest::probe::{reply_subject, Prober, SignedDelivery};
use devquest::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init("info");

    let base_url = env::var("PROBE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let signing_key = env::var("WEBHOOK_SIGNING_KEY").ok().filter(|k| !k.trim().is_empty());
    let sender = env::var("PROBE_SENDER").unwrap_or_else(|_| "probe@example.com".to_string());
    let recipient =
        env::var("PROBE_RECIPIENT").unwrap_or_else(|_| "support@devquest.io".to_string());

    let ticket_id = match env::var("PROBE_TICKET_ID") {
        Ok(raw) => Some(raw.trim().parse::<u64>().context("PROBE_TICKET_ID is not a number")?),
        Err(_) => None,
    };

    let (subject, body) = match ticket_id {
        Some(id) => (
            reply_subject(id),
            "This is a test reply sent by the webhook probe.".to_string(),
        ),
        None => (
            "Webhook probe - new support request".to_string(),
            "This is a test message sent by the webhook probe.".to_string(),
        ),
    };

    let delivery = SignedDelivery::new(signing_key.as_deref(), &sender, &recipient, &subject, &body);

    info!(
        base_url = %base_url,
        signed = signing_key.is_some(),
        reply_to = ?ticket_id,
        "probe_starting"
    );

    let prober = Prober::new(&base_url, Duration::from_secs(10))?;
    let report = prober.run(&delivery).await?;

    println!("{} {}", report.status, report.body);

    if report.status != 200 {
        anyhow::bail!("Webhook answered with status {}", report.status);
    }

    Ok(())
}
