//! Host integration — startup signal and the interactive consent exchange.
//!
//! ARCHITECTURE
//! ============
//! The host owns the surface a user sees during consent. Its contract is a
//! plain async request/response: the caller hands over the consent URL and
//! popup size, the host returns the raw payload the login page produced (or
//! a typed failure). Timeout and cancellation are part of the exchange, so an
//! abandoned popup can never park the caller forever.
//!
//! Startup is explicit. `ConsentHost::initialize` flips a [`HostSignal`] from
//! `Pending` to `Ready` or `Failed`, and anything that needs a live host can
//! await that signal instead of assuming global state.

pub mod loopback;

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::error::ErrorCode;
use crate::identity::{Account, TokenGrant};

pub use loopback::LoopbackHost;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by the consent exchange.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    /// No payload arrived before the deadline.
    #[error("consent timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The exchange was cancelled by the caller.
    #[error("consent cancelled")]
    Cancelled,

    /// The host could not present the consent surface.
    #[error("consent surface unavailable: {0}")]
    Host(String),

    /// The login page reported a failure instead of a payload.
    #[error("login page reported failure: {0}")]
    Failure(String),

    /// The payload is not valid JSON or its account is unreadable.
    #[error("malformed consent payload: {0}")]
    MalformedPayload(String),

    /// The payload parsed but carries no `account`.
    #[error("consent payload has no account")]
    MissingAccount,

    /// The consented account could not be stored.
    #[error("could not store consented account: {0}")]
    Store(String),
}

impl ErrorCode for ConsentError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "E_CONSENT_TIMEOUT",
            Self::Cancelled => "E_CONSENT_CANCELLED",
            Self::Host(_) => "E_CONSENT_HOST",
            Self::Failure(_) => "E_CONSENT_FAILURE",
            Self::MalformedPayload(_) => "E_CONSENT_MALFORMED",
            Self::MissingAccount => "E_CONSENT_NO_ACCOUNT",
            Self::Store(_) => "E_CONSENT_STORE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }
}

// =============================================================================
// STARTUP SIGNAL
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    Pending,
    Ready,
    Failed(String),
}

/// Completion signal for the host's startup step.
pub struct HostSignal {
    tx: watch::Sender<HostStatus>,
}

impl HostSignal {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HostStatus::Pending);
        Self { tx }
    }

    #[must_use]
    pub fn status(&self) -> HostStatus {
        self.tx.borrow().clone()
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(HostStatus::Ready);
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.tx.send_replace(HostStatus::Failed(reason.into()));
    }

    /// Wait until startup has finished, successfully or not.
    pub async fn wait_ready(&self) -> Result<(), ConfigError> {
        let mut rx = self.tx.subscribe();
        let status = rx
            .wait_for(|s| *s != HostStatus::Pending)
            .await
            .map_err(|e| ConfigError::HostInit(e.to_string()))?;
        match &*status {
            HostStatus::Failed(reason) => Err(ConfigError::HostInit(reason.clone())),
            _ => Ok(()),
        }
    }
}

impl Default for HostSignal {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CONSENT EXCHANGE
// =============================================================================

/// One interactive consent request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateParameters {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
}

/// Surface that can run interactive consent. Enables mocking in tests.
#[async_trait::async_trait]
pub trait ConsentHost: Send + Sync {
    /// Startup step. Idempotent; resolves once the host is ready.
    async fn initialize(&self) -> Result<(), ConfigError>;

    /// Present the consent surface and wait for the login page's payload.
    async fn authenticate(
        &self,
        params: &AuthenticateParameters,
        cancel: &CancellationToken,
    ) -> Result<String, ConsentError>;
}

/// Build `<loginEndpoint>?clientId=<id>&scope=<scope>&loginHint=<hint>`.
///
/// Scopes are space-joined and percent-encoded. `loginHint` is omitted when
/// no hint is configured.
#[must_use]
pub fn consent_url(login_endpoint: &str, client_id: &str, scopes: &[String], login_hint: Option<&str>) -> String {
    let separator = if login_endpoint.contains('?') { '&' } else { '?' };
    let scope = scopes.join(" ");
    let mut url = format!(
        "{login_endpoint}{separator}clientId={}&scope={}",
        urlencoding::encode(client_id),
        urlencoding::encode(&scope)
    );
    if let Some(hint) = login_hint {
        url.push_str("&loginHint=");
        url.push_str(&urlencoding::encode(hint));
    }
    url
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// What the login page hands back after a successful consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentPayload {
    pub account: Account,
    pub grant: TokenGrant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConsentPayload {
    #[serde(default)]
    account: Option<serde_json::Value>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    expires_in: Option<serde_json::Value>,
    scope: Option<String>,
    scopes: Option<Vec<String>>,
}

/// Parse the raw consent payload.
///
/// - not a JSON object → `MalformedPayload`
/// - `account` absent or `null` → `MissingAccount`
/// - `account` present but not an account → `MalformedPayload`
pub fn parse_consent_payload(raw: &str) -> Result<ConsentPayload, ConsentError> {
    let parsed: RawConsentPayload =
        serde_json::from_str(raw.trim()).map_err(|e| ConsentError::MalformedPayload(e.to_string()))?;

    let account_value = match parsed.account {
        None | Some(serde_json::Value::Null) => return Err(ConsentError::MissingAccount),
        Some(v) => v,
    };
    let account: Account =
        serde_json::from_value(account_value).map_err(|e| ConsentError::MalformedPayload(format!("account: {e}")))?;

    let expires_in = parsed.expires_in.and_then(|v| match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    });
    let scopes = parsed
        .scopes
        .or_else(|| {
            parsed
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
        })
        .unwrap_or_default();

    Ok(ConsentPayload {
        account,
        grant: TokenGrant {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            id_token: parsed.id_token,
            expires_in,
            scopes,
        },
    })
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
