//! Inbound email payload extraction.
//!
//! The provider posts `multipart/form-data` (or url-encoded form data for
//! stored-message notifications). Field names use hyphens, e.g. `body-plain`.

use std::collections::HashMap;

use axum::extract::{Form, FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::error::WebhookError;

/// One inbound email delivery as posted by the provider.
///
/// Unknown fields (attachment counts, message headers, HTML bodies) are
/// ignored; missing fields are left empty and caught by [`validate`].
///
/// [`validate`]: InboundEmailEvent::validate
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InboundEmailEvent {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    #[serde(rename = "body-plain")]
    pub body_plain: String,
    /// Reply text with quoted history and signature removed
    #[serde(rename = "stripped-text")]
    pub stripped_text: Option<String>,
    /// Raw `From` header, e.g. `Jane Doe <jane@example.com>`
    #[serde(rename = "from")]
    pub from_field: String,
    pub timestamp: String,
    pub token: String,
    pub signature: String,
}

impl InboundEmailEvent {
    /// Build an event from already-decoded text fields, e.g. multipart parts.
    pub fn from_fields(fields: HashMap<String, String>) -> Result<Self, WebhookError> {
        let object: Map<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect();

        serde_json::from_value(Value::Object(object)).map_err(|e| {
            warn!(error = %e, "email_webhook_fields_rejected");
            WebhookError::MalformedPayload("unreadable form fields")
        })
    }

    /// Sender address, falling back to the address inside `From`.
    pub fn sender_address(&self) -> Option<String> {
        let sender = self.sender.trim();
        if !sender.is_empty() {
            return Some(sender.to_string());
        }
        address_from_header(&self.from_field)
    }

    /// Message text for a new ticket: the full plain body.
    pub fn full_text(&self) -> Option<&str> {
        Some(self.body_plain.trim())
            .filter(|s| !s.is_empty())
            .or_else(|| self.stripped_text.as_deref().map(str::trim))
            .filter(|s| !s.is_empty())
    }

    /// Message text for a reply: the stripped reply when the provider sent one.
    pub fn reply_text(&self) -> Option<&str> {
        self.stripped_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| self.full_text())
    }

    /// Check the fields every delivery needs before anything else runs.
    pub fn validate(&self, inbox_domain: Option<&str>) -> Result<(), WebhookError> {
        if self.sender_address().is_none() {
            return Err(WebhookError::MalformedPayload("missing sender"));
        }
        if self.subject.trim().is_empty() {
            return Err(WebhookError::MalformedPayload("missing subject"));
        }
        if self.full_text().is_none() {
            return Err(WebhookError::MalformedPayload("missing body"));
        }

        if let Some(domain) = inbox_domain {
            let recipient = self.recipient.trim().to_lowercase();
            if !recipient.ends_with(&format!("@{}", domain)) {
                warn!(
                    recipient = %self.recipient,
                    expected_domain = %domain,
                    "email_webhook_invalid_recipient_domain"
                );
                return Err(WebhookError::MalformedPayload("unexpected recipient"));
            }
        }

        Ok(())
    }
}

/// Extract the address from a header value such as `Name <addr@host>`.
fn address_from_header(value: &str) -> Option<String> {
    let value = value.trim();
    let address = match (value.rfind('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => &value[start + 1..end],
        _ => value,
    };
    let address = address.trim();

    if address.contains('@') {
        Some(address.to_string())
    } else {
        None
    }
}

/// Read the request body into an event, dispatching on the content type.
pub async fn read_event(request: Request) -> Result<InboundEmailEvent, WebhookError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        return InboundEmailEvent::from_fields(read_multipart(request).await?);
    }

    let Form(event) = Form::<InboundEmailEvent>::from_request(request, &())
        .await
        .map_err(|e| {
            warn!(error = %e, "email_webhook_form_rejected");
            WebhookError::MalformedPayload("unreadable form body")
        })?;

    Ok(event)
}

async fn read_multipart(request: Request) -> Result<HashMap<String, String>, WebhookError> {
    let mut multipart = Multipart::from_request(request, &()).await.map_err(|e| {
        warn!(error = %e, "email_webhook_multipart_rejected");
        WebhookError::MalformedPayload("unreadable multipart body")
    })?;

    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "email_webhook_multipart_field_failed");
        WebhookError::MalformedPayload("unreadable multipart field")
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        // Attachments are not part of the ticket text
        if field.file_name().is_some() {
            debug!(field = %name, "email_webhook_attachment_skipped");
            continue;
        }

        let value = field.text().await.map_err(|e| {
            warn!(field = %name, error = %e, "email_webhook_multipart_text_failed");
            WebhookError::MalformedPayload("unreadable multipart field")
        })?;
        fields.insert(name, value);
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;

    fn event() -> InboundEmailEvent {
        InboundEmailEvent {
            sender: "student@example.com".to_string(),
            recipient: "support@devquest.io".to_string(),
            subject: "Help".to_string(),
            body_plain: "Cannot log in".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_fields_maps_hyphenated_names() {
        let fields = HashMap::from([
            ("sender".to_string(), "a@example.com".to_string()),
            ("body-plain".to_string(), "hello".to_string()),
            ("stripped-text".to_string(), "   ".to_string()),
            ("token".to_string(), "tok".to_string()),
            ("attachment-count".to_string(), "0".to_string()),
        ]);

        let event = InboundEmailEvent::from_fields(fields).unwrap();

        assert_eq!(event.sender, "a@example.com");
        assert_eq!(event.body_plain, "hello");
        assert_eq!(event.token, "tok");
        assert!(event.subject.is_empty());
        // A blank stripped reply falls back to the plain body
        assert_eq!(event.reply_text(), Some("hello"));
    }

    #[test]
    fn test_sender_falls_back_to_from_header() {
        let mut event = event();
        event.sender = " ".to_string();
        event.from_field = "Jane Doe <jane@example.com>".to_string();

        assert_eq!(event.sender_address(), Some("jane@example.com".to_string()));

        event.from_field = "jane@example.com".to_string();
        assert_eq!(event.sender_address(), Some("jane@example.com".to_string()));

        event.from_field = "Jane Doe".to_string();
        assert_eq!(event.sender_address(), None);
    }

    #[test]
    fn test_reply_text_prefers_stripped() {
        let mut event = event();
        event.body_plain = "Thanks!\n\n> On Monday support wrote:\n> ...".to_string();
        event.stripped_text = Some("Thanks!".to_string());

        assert_eq!(event.reply_text(), Some("Thanks!"));
        assert!(event.full_text().unwrap().contains("support wrote"));
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(event().validate(None).is_ok());

        let mut missing_sender = event();
        missing_sender.sender.clear();
        assert_eq!(
            missing_sender.validate(None),
            Err(WebhookError::MalformedPayload("missing sender"))
        );

        let mut missing_subject = event();
        missing_subject.subject = "  ".to_string();
        assert!(missing_subject.validate(None).is_err());

        let mut missing_body = event();
        missing_body.body_plain.clear();
        assert!(missing_body.validate(None).is_err());
    }

    #[test]
    fn test_validate_recipient_domain() {
        assert!(event().validate(Some("devquest.io")).is_ok());

        let mut other = event();
        other.recipient = "support@elsewhere.io".to_string();
        assert_eq!(
            other.validate(Some("devquest.io")),
            Err(WebhookError::MalformedPayload("unexpected recipient"))
        );
    }

    #[tokio::test]
    async fn test_read_event_urlencoded() {
        let request = http::Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "sender=a%40example.com&subject=Hi&body-plain=Hello+there&attachment-count=0",
            ))
            .unwrap();

        let event = read_event(request).await.unwrap();

        assert_eq!(event.sender, "a@example.com");
        assert_eq!(event.subject, "Hi");
        assert_eq!(event.body_plain, "Hello there");
        assert_eq!(event.stripped_text, None);
    }

    #[tokio::test]
    async fn test_read_event_multipart_skips_attachments() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"sender\"\r\n\r\n\
            a@example.com\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"attachment-1\"; filename=\"log.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            stack trace\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"body-plain\"\r\n\r\n\
            Hello\r\n\
            --XYZ--\r\n";
        let request = http::Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
            .body(Body::from(body))
            .unwrap();

        let event = read_event(request).await.unwrap();

        assert_eq!(event.sender, "a@example.com");
        assert_eq!(event.body_plain, "Hello");
    }

    #[tokio::test]
    async fn test_read_event_rejects_json() {
        let request = http::Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        assert!(matches!(
            read_event(request).await,
            Err(WebhookError::MalformedPayload(_))
        ));
    }
}
