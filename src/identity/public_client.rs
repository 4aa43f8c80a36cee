//! Public client application — silent acquisition against a token cache.
//!
//! Silent acquisition order:
//! 1. a cached access token for the account that covers the requested scopes
//! 2. a refresh-token grant against the authority's token endpoint
//! 3. `InteractionRequired`
//!
//! Tenant discovery happens on the first network call and is memoized.
//! Pure response parsing lives in `parse_token_response` for testability.

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::authority::Authority;
use super::cache::{AccessTokenEntry, TokenCache};
use super::{Account, AuthResult, IdentityClient, IdentityError, SilentRequest, TokenGrant, normalize_scopes, now_unix};
use crate::config::HttpTimeouts;

const CLIENT_REQUEST_ID_HEADER: &str = "client-request-id";
const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// OAuth error codes that mean "a user has to get involved".
const INTERACTION_ERRORS: &[&str] = &["invalid_grant", "interaction_required", "consent_required", "login_required"];

// =============================================================================
// CLIENT
// =============================================================================

pub struct PublicClientApplication {
    client_id: String,
    authority_url: String,
    http: reqwest::Client,
    authority: OnceCell<Authority>,
    cache: TokenCache,
}

impl PublicClientApplication {
    /// Bind a client to `authority_url`. No network traffic until the first
    /// token request that misses the cache.
    pub fn new(
        client_id: impl Into<String>,
        authority_url: impl Into<String>,
        cache: TokenCache,
        timeouts: HttpTimeouts,
    ) -> Result<Self, IdentityError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| IdentityError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            client_id: client_id.into(),
            authority_url: authority_url.into().trim_end_matches('/').to_string(),
            http,
            authority: OnceCell::new(),
            cache,
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn authority_url(&self) -> &str {
        &self.authority_url
    }

    #[must_use]
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    async fn authority(&self) -> Result<&Authority, IdentityError> {
        self.authority
            .get_or_try_init(|| Authority::discover(&self.http, &self.authority_url))
            .await
    }

    async fn acquire_token_silent_at(&self, request: &SilentRequest, now: i64) -> Result<AuthResult, IdentityError> {
        let account = request
            .account
            .clone()
            .or_else(|| self.cache.active_account())
            .ok_or(IdentityError::NoAccount)?;

        if let Some(entry) = self
            .cache
            .find_access_token(&account.home_account_id, &request.scopes, now)
        {
            tracing::debug!(account = %account.username, "access token served from cache");
            return Ok(AuthResult {
                access_token: entry.secret,
                account,
                scopes: entry.scopes,
                expires_on: entry.expires_on,
                from_cache: true,
            });
        }

        let Some(refresh_token) = self.cache.refresh_token(&account.home_account_id) else {
            return Err(IdentityError::InteractionRequired(format!(
                "no cached token for {}",
                account.username
            )));
        };

        self.redeem_refresh_token(account, &request.scopes, &refresh_token, now)
            .await
    }

    async fn redeem_refresh_token(
        &self,
        account: Account,
        scopes: &[String],
        refresh_token: &str,
        now: i64,
    ) -> Result<AuthResult, IdentityError> {
        let token_endpoint = self.authority().await?.token_endpoint.clone();
        let scope = request_scope(scopes);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];

        let request_id = Uuid::new_v4();
        tracing::debug!(%request_id, account = %account.username, "redeeming refresh token");

        let response = self
            .http
            .post(&token_endpoint)
            .header(CLIENT_REQUEST_ID_HEADER, request_id.to_string())
            .form(&params)
            .send()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| IdentityError::Request(e.to_string()))?;

        let tokens = parse_token_response(status, &body)?;
        let granted = if tokens.scopes.is_empty() { normalize_scopes(scopes) } else { normalize_scopes(&tokens.scopes) };
        let expires_on = now + i64::try_from(tokens.expires_in).unwrap_or(i64::MAX - now);

        let entry = AccessTokenEntry {
            home_account_id: account.home_account_id.clone(),
            secret: tokens.access_token.clone(),
            scopes: granted.clone(),
            expires_on,
        };
        self.cache
            .store_tokens(&account, Some(entry), tokens.refresh_token, now)
            .await?;

        Ok(AuthResult { access_token: tokens.access_token, account, scopes: granted, expires_on, from_cache: false })
    }
}

#[async_trait::async_trait]
impl IdentityClient for PublicClientApplication {
    async fn acquire_token_silent(&self, request: &SilentRequest) -> Result<AuthResult, IdentityError> {
        self.acquire_token_silent_at(request, now_unix()).await
    }

    fn active_account(&self) -> Option<Account> {
        self.cache.active_account()
    }

    async fn set_active_account(&self, account: Account) -> Result<(), IdentityError> {
        self.cache.set_active_account(account).await
    }

    async fn save_grant(
        &self,
        account: &Account,
        grant: &TokenGrant,
        requested: &[String],
    ) -> Result<(), IdentityError> {
        let now = now_unix();
        let access = match (&grant.access_token, grant.expires_in) {
            (Some(secret), Some(expires_in)) => {
                let scopes = if grant.scopes.is_empty() { requested } else { grant.scopes.as_slice() };
                Some(AccessTokenEntry {
                    home_account_id: account.home_account_id.clone(),
                    secret: secret.clone(),
                    scopes: normalize_scopes(scopes),
                    expires_on: now + i64::try_from(expires_in).unwrap_or(i64::MAX - now),
                })
            }
            _ => None,
        };
        self.cache
            .sign_in(account, access, grant.refresh_token.clone(), now)
            .await
    }

    fn accounts(&self) -> Vec<Account> {
        self.cache.accounts()
    }

    async fn clear(&self) -> Result<(), IdentityError> {
        self.cache.clear().await
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,

    // Error
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct TokenSuccess {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: u64,
    scopes: Vec<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Requested scopes plus `offline_access` so the grant returns a new refresh token.
fn request_scope(scopes: &[String]) -> String {
    let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
    if !all.iter().any(|s| s.eq_ignore_ascii_case(OFFLINE_ACCESS_SCOPE)) {
        all.push(OFFLINE_ACCESS_SCOPE);
    }
    all.join(" ")
}

fn parse_token_response(status: u16, body: &str) -> Result<TokenSuccess, IdentityError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| IdentityError::Parse(format!("status {status}: {e}")))?;

    if let Some(error) = parsed.error {
        let description = parsed.error_description.unwrap_or_default();
        if INTERACTION_ERRORS.contains(&error.as_str()) {
            return Err(IdentityError::InteractionRequired(format!("{error}: {description}")));
        }
        return Err(IdentityError::TokenEndpoint { error, description });
    }

    if !(200..300).contains(&status) {
        return Err(IdentityError::TokenEndpoint { error: format!("http_{status}"), description: body.to_string() });
    }

    let access_token = parsed
        .access_token
        .ok_or_else(|| IdentityError::Parse("missing access_token".into()))?;
    let scopes = parsed
        .scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    Ok(TokenSuccess {
        access_token,
        refresh_token: parsed.refresh_token,
        expires_in: parsed.expires_in.unwrap_or(0),
        scopes,
    })
}

#[cfg(test)]
#[path = "public_client_test.rs"]
mod tests;
