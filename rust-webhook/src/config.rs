//! Configuration module for environment variable parsing.
//!
//! Everything is read once at start-up and shared read-only afterwards.

use std::env;
use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Shared HMAC key the email provider signs deliveries with
    pub webhook_signing_key: Option<String>,

    /// Maximum distance in seconds between a delivery timestamp and now
    pub signature_tolerance_seconds: u64,

    /// Accept unsigned deliveries when no signing key is configured
    pub permissive_mode: bool,

    /// Optional domain every recipient must belong to
    pub support_inbox_domain: Option<String>,

    /// Base URL of the platform backend that owns support tickets
    pub ticket_store_url: Option<String>,

    /// Bearer token for the platform backend
    pub ticket_store_token: Option<String>,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// How long a delivery token is remembered for replay detection
    pub replay_token_ttl_seconds: u64,

    /// Replay cache size at which expired tokens are swept
    pub replay_max_entries: usize,
}

/// What to do with a delivery's signature fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignaturePolicy {
    /// A signing key is configured; every delivery must verify against it.
    Verify { signing_key: String },
    /// No signing key and strict mode: every delivery is rejected.
    RejectUnsigned,
    /// No signing key and permissive mode: deliveries pass with a warning.
    AcceptUnsigned,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            webhook_signing_key: None,
            signature_tolerance_seconds: 300,
            permissive_mode: false,
            support_inbox_domain: None,
            ticket_store_url: None,
            ticket_store_token: None,
            request_timeout_ms: 8000,
            replay_token_ttl_seconds: 900,
            replay_max_entries: 100_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            port: parse_or("PORT", defaults.port),

            webhook_signing_key: non_empty("WEBHOOK_SIGNING_KEY"),

            signature_tolerance_seconds: parse_or(
                "SIGNATURE_TOLERANCE_SECONDS",
                defaults.signature_tolerance_seconds,
            ),

            permissive_mode: parse_flag("PERMISSIVE_MODE", defaults.permissive_mode),

            support_inbox_domain: non_empty("SUPPORT_INBOX_DOMAIN")
                .map(|d| d.trim_start_matches('@').to_lowercase()),

            ticket_store_url: non_empty("TICKET_STORE_URL"),

            ticket_store_token: non_empty("TICKET_STORE_TOKEN"),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),

            replay_token_ttl_seconds: parse_or(
                "REPLAY_TOKEN_TTL_SECONDS",
                defaults.replay_token_ttl_seconds,
            ),

            replay_max_entries: parse_or("REPLAY_MAX_ENTRIES", defaults.replay_max_entries),
        }
    }

    /// Resolve the signing key and permissive flag into one explicit policy.
    pub fn signature_policy(&self) -> SignaturePolicy {
        match self.webhook_signing_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => SignaturePolicy::Verify {
                signing_key: key.to_string(),
            },
            _ if self.permissive_mode => SignaturePolicy::AcceptUnsigned,
            _ => SignaturePolicy::RejectUnsigned,
        }
    }

    /// Replay cache retention.
    ///
    /// A token must outlive every timestamp the verifier would still accept,
    /// which spans the tolerance window on both sides of now.
    pub fn replay_ttl_seconds(&self) -> u64 {
        let floor = self.signature_tolerance_seconds.saturating_mul(2);
        if self.replay_token_ttl_seconds < floor {
            warn!(
                configured = self.replay_token_ttl_seconds,
                floor = floor,
                "replay_ttl_below_tolerance_window"
            );
            return floor;
        }
        self.replay_token_ttl_seconds
    }
}

/// Parse a variable, falling back to the default when unset or invalid.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean flag such as "true", "1", "yes" or "off".
fn parse_flag(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid flag, using default");
            default
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
