//! Diagnostic harness that posts provider-style signed deliveries.
//!
//! Probes run in a fixed order and stop at the first failure:
//! 1. `GET /health` proves the server is up
//! 2. `POST /api/email-webhook` with a freshly signed delivery

use std::time::Duration;

use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::{multipart, Client};
use tracing::{info, warn};

use crate::web::signature::{sign, unix_now};
use crate::web::WEBHOOK_PATH;

/// Length of generated delivery tokens, matching the provider's 50 chars.
const TOKEN_LENGTH: usize = 50;

/// A delivery as the provider would post it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDelivery {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body_plain: String,
    pub timestamp: String,
    pub token: String,
    pub signature: String,
}

impl SignedDelivery {
    /// Build a delivery signed with `signing_key` at the current time.
    ///
    /// With no key the signature is left blank, which a strict server rejects.
    pub fn new(
        signing_key: Option<&str>,
        sender: &str,
        recipient: &str,
        subject: &str,
        body_plain: &str,
    ) -> Self {
        let timestamp = unix_now().to_string();
        let token = random_token();
        let signature = signing_key
            .and_then(|key| sign(key, &timestamp, &token))
            .unwrap_or_default();

        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body_plain: body_plain.to_string(),
            timestamp,
            token,
            signature,
        }
    }

    /// Form fields under the provider's field names.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("sender", self.sender.clone()),
            ("recipient", self.recipient.clone()),
            ("subject", self.subject.clone()),
            ("body-plain", self.body_plain.clone()),
            ("timestamp", self.timestamp.clone()),
            ("token", self.token.clone()),
            ("signature", self.signature.clone()),
        ]
    }

    pub fn to_multipart(&self) -> multipart::Form {
        self.fields()
            .into_iter()
            .fold(multipart::Form::new(), |form, (name, value)| form.text(name, value))
    }
}

/// Generate a random alphanumeric delivery token.
pub fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Subject line of a reply to an existing ticket, as mail clients produce it.
pub fn reply_subject(ticket_id: u64) -> String {
    format!("Re: DevQuest Support - New Reply to Ticket #{}", ticket_id)
}

/// Outcome of the webhook probe.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub status: u16,
    pub body: String,
}

/// Runs the ordered probes against one server.
pub struct Prober {
    client: Client,
    base_url: String,
}

impl Prober {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Probe `/health`, then post `delivery` to the webhook.
    pub async fn run(&self, delivery: &SignedDelivery) -> Result<ProbeReport> {
        self.check_health().await?;
        self.post_delivery(delivery).await
    }

    async fn check_health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Health probe failed: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "probe_health_failed");
            anyhow::bail!("Health probe returned status {}", status);
        }

        info!(url = %url, "probe_health_ok");
        Ok(())
    }

    async fn post_delivery(&self, delivery: &SignedDelivery) -> Result<ProbeReport> {
        let url = format!("{}{}", self.base_url, WEBHOOK_PATH);
        let response = self
            .client
            .post(&url)
            .multipart(delivery.to_multipart())
            .send()
            .await
            .with_context(|| format!("Webhook probe failed: {}", url))?;

        let status = response.status().as_u16();
        let body = response.text().await.context("Failed to read webhook response")?;

        info!(
            url = %url,
            status = status,
            token = %delivery.token,
            "probe_webhook_posted"
        );

        Ok(ProbeReport { status, body })
    }
}
