//! REST client for the platform backend's support ticket API.
//!
//! Endpoints, relative to `TICKET_STORE_URL`:
//! - `POST support/tickets` opens a ticket
//! - `POST support/tickets/{id}/messages` appends a user reply
//!
//! Both send the delivery token as `Idempotency-Key` so the backend can
//! drop provider redeliveries.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use super::store::{StoreError, TicketStore};
use super::types::{InboundMessage, SenderType, SupportTicket};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Ticket store that delegates to the platform backend over HTTP.
///
/// Built once at start-up; the inner client pools connections across
/// requests.
#[derive(Clone)]
pub struct HttpTicketStore {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTicketRequest<'a> {
    email: &'a str,
    subject: &'a str,
    message: &'a str,
    source: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppendMessageRequest<'a> {
    email: &'a str,
    message: &'a str,
    sender_type: SenderType,
}

impl HttpTicketStore {
    /// Create a store for the backend at `base_url`.
    pub fn new(base_url: &str, service_token: Option<String>, timeout: Duration) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends in '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).context("Invalid ticket store URL")?;

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(16)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            service_token,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::Other(format!("invalid endpoint {path}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder, delivery_token: &str) -> RequestBuilder {
        let request = match &self.service_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        if delivery_token.is_empty() {
            request
        } else {
            request.header(IDEMPOTENCY_HEADER, delivery_token)
        }
    }
}

/// Turn a backend response into a ticket or a store error.
async fn read_ticket(
    response: reqwest::Response,
    ticket_id: Option<u64>,
) -> Result<SupportTicket, StoreError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        if let Some(id) = ticket_id {
            return Err(StoreError::TicketNotFound(id));
        }
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(
            status = status.as_u16(),
            body_preview = %body.chars().take(200).collect::<String>(),
            "ticket_backend_error"
        );
        return Err(StoreError::Backend {
            status: status.as_u16(),
            body,
        });
    }

    Ok(response.json::<SupportTicket>().await?)
}

#[async_trait]
impl TicketStore for HttpTicketStore {
    async fn create_ticket(&self, message: &InboundMessage) -> Result<SupportTicket, StoreError> {
        let url = self.endpoint("support/tickets")?;
        let body = CreateTicketRequest {
            email: &message.sender,
            subject: &message.subject,
            message: &message.content,
            source: "email",
        };

        let response = self
            .authorize(self.client.post(url), &message.delivery_token)
            .json(&body)
            .send()
            .await?;

        let ticket = read_ticket(response, None).await?;
        info!(ticket_id = ticket.ticket_id, "ticket_backend_created");
        Ok(ticket)
    }

    async fn append_message(
        &self,
        ticket_id: u64,
        message: &InboundMessage,
    ) -> Result<SupportTicket, StoreError> {
        let url = self.endpoint(&format!("support/tickets/{ticket_id}/messages"))?;
        let body = AppendMessageRequest {
            email: &message.sender,
            message: &message.content,
            sender_type: SenderType::User,
        };

        let response = self
            .authorize(self.client.post(url), &message.delivery_token)
            .json(&body)
            .send()
            .await?;

        let ticket = read_ticket(response, Some(ticket_id)).await?;
        info!(ticket_id = ticket.ticket_id, "ticket_backend_message_appended");
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> InboundMessage {
        InboundMessage {
            sender: "student@example.com".to_string(),
            subject: "Video won't load".to_string(),
            content: "Lesson 2 video is blank".to_string(),
            delivery_token: "tok-1".to_string(),
        }
    }

    fn store(server: &MockServer) -> HttpTicketStore {
        HttpTicketStore::new(
            &format!("{}/api", server.uri()),
            Some("service-secret".to_string()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_ticket_posts_to_backend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/support/tickets"))
            .and(header("Idempotency-Key", "tok-1"))
            .and(header("Authorization", "Bearer service-secret"))
            .and(body_partial_json(serde_json::json!({
                "email": "student@example.com",
                "source": "email"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "ticketId": 55,
                "status": "open"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ticket = store(&server).create_ticket(&message()).await.unwrap();

        assert_eq!(ticket.ticket_id, 55);
    }

    #[tokio::test]
    async fn test_append_message_posts_to_ticket() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/support/tickets/123/messages"))
            .and(body_partial_json(serde_json::json!({"senderType": "user"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ticketId": 123,
                "status": "open"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ticket = store(&server).append_message(123, &message()).await.unwrap();

        assert_eq!(ticket.ticket_id, 123);
    }

    #[tokio::test]
    async fn test_append_missing_ticket_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/support/tickets/9/messages"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = store(&server).append_message(9, &message()).await;

        assert!(matches!(result, Err(StoreError::TicketNotFound(9))));
    }

    #[tokio::test]
    async fn test_backend_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/support/tickets"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let result = store(&server).create_ticket(&message()).await;

        match result {
            Err(StoreError::Backend { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("Expected backend error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpTicketStore::new("not a url", None, Duration::from_secs(1)).is_err());
    }
}
