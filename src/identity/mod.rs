//! Identity — accounts, tokens, and the silent-acquisition seam.
//!
//! DESIGN
//! ======
//! `IdentityClient` is the only surface the caller sees. The production
//! implementation is [`public_client::PublicClientApplication`], which serves
//! tokens from a persisted cache and falls back to a refresh-token grant.
//! Anything that needs a user in front of a browser is outside this module:
//! when no token can be produced silently it returns an error and the caller
//! decides whether to run consent.

pub mod authority;
pub mod cache;
pub mod public_client;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

pub use public_client::PublicClientApplication;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by identity client operations.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// No active account and none passed in the request.
    #[error("no active account; interactive consent required")]
    NoAccount,

    /// The cache holds nothing usable, or the token endpoint demands interaction.
    #[error("interaction required: {0}")]
    InteractionRequired(String),

    /// The authority's OpenID configuration could not be fetched.
    #[error("tenant discovery failed: {0}")]
    Discovery(String),

    /// The HTTP request to the token endpoint failed.
    #[error("token request failed: {0}")]
    Request(String),

    /// The token endpoint returned an OAuth error that is not an interaction prompt.
    #[error("token endpoint error {error}: {description}")]
    TokenEndpoint { error: String, description: String },

    /// The token endpoint response body could not be deserialized.
    #[error("token response parse failed: {0}")]
    Parse(String),

    /// The account cache could not be read or written.
    #[error("account cache error: {0}")]
    Cache(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ErrorCode for IdentityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoAccount => "E_NO_ACCOUNT",
            Self::InteractionRequired(_) => "E_INTERACTION_REQUIRED",
            Self::Discovery(_) => "E_TENANT_DISCOVERY",
            Self::Request(_) => "E_TOKEN_REQUEST",
            Self::TokenEndpoint { .. } => "E_TOKEN_ENDPOINT",
            Self::Parse(_) => "E_TOKEN_PARSE",
            Self::Cache(_) => "E_ACCOUNT_CACHE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Discovery(_))
    }
}

// =============================================================================
// ACCOUNT
// =============================================================================

/// Identity-provider account handle, in the shape MSAL serializes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub home_account_id: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub local_account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// =============================================================================
// TOKENS
// =============================================================================

/// Tokens handed back alongside an account by the consent exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: Option<u64>,
    /// Scopes the grant covers; empty means "the scopes that were requested".
    pub scopes: Vec<String>,
}

/// Silent token request.
#[derive(Debug, Clone)]
pub struct SilentRequest {
    pub scopes: Vec<String>,
    /// Account to use; falls back to the active account when `None`.
    pub account: Option<Account>,
}

/// Successful token acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub access_token: String,
    pub account: Account,
    pub scopes: Vec<String>,
    /// Absolute expiry, unix seconds.
    pub expires_on: i64,
    /// `true` when served from the cache without a network round-trip.
    pub from_cache: bool,
}

// =============================================================================
// CLIENT TRAIT
// =============================================================================

/// Silent-acquisition client. Enables mocking in tests.
#[async_trait::async_trait]
pub trait IdentityClient: Send + Sync {
    /// Acquire a token without user interaction.
    async fn acquire_token_silent(&self, request: &SilentRequest) -> Result<AuthResult, IdentityError>;

    /// The account currently selected for token requests.
    fn active_account(&self) -> Option<Account>;

    /// Select `account` for subsequent requests and persist the choice.
    async fn set_active_account(&self, account: Account) -> Result<(), IdentityError>;

    /// Make `account` active and store the tokens consent returned, in one write.
    async fn save_grant(&self, account: &Account, grant: &TokenGrant, requested: &[String])
    -> Result<(), IdentityError>;

    /// All known accounts.
    fn accounts(&self) -> Vec<Account>;

    /// Forget every account and token.
    async fn clear(&self) -> Result<(), IdentityError>;
}

/// Current time as unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Case-insensitive, order-independent form of a scope list.
#[must_use]
pub fn normalize_scopes(scopes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = scopes.iter().map(|s| s.trim().to_ascii_lowercase()).filter(|s| !s.is_empty()).collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
