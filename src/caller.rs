//! AuthorizedCaller — silent token, consent fallback, function call.
//!
//! DESIGN
//! ======
//! One invocation walks a small state machine over `needs_consent`:
//!
//! ```text
//! Initialize ──> SilentAttempt ──ok──> RemoteCall ──> Terminal
//!                    │ err
//!                    v
//!               NeedsConsent ──ok──> SilentAttempt (once) ──err──> Terminal
//!                    │ err
//!                    v
//!                 Terminal
//! ```
//!
//! A silent failure always sets the flag; only a completed consent clears
//! it. If the flag is still set when an invocation starts (the last consent
//! was abandoned or failed), the invocation opens consent before trying
//! silently.
//!
//! CONCURRENCY
//! ===========
//! Invocations are serialized on `in_flight`. A second trigger waits for the
//! first to finish and then runs against the cache the first one filled, so
//! two clicks never open two popups or interleave writes to the flag.
//!
//! Each invocation installs its own cancellation token while holding
//! `in_flight`. `cancel_consent` reaches that token whether it fires during
//! host startup, the silent attempt, or an open popup.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ConfigError, PopupSize};
use crate::error::CallerError;
use crate::host::{AuthenticateParameters, ConsentError, ConsentHost, consent_url, parse_consent_payload};
use crate::identity::{AuthResult, IdentityClient, IdentityError, SilentRequest};
use crate::remote::RemoteFunction;
use crate::view::CallResult;

// =============================================================================
// SETTINGS & STATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerSettings {
    pub client_id: String,
    pub login_endpoint: String,
    pub scopes: Vec<String>,
    pub login_hint: Option<String>,
    pub popup: PopupSize,
    pub consent_timeout: Duration,
}

impl CallerSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            login_endpoint: config.initiate_login_endpoint.clone(),
            scopes: config.scopes.clone(),
            login_hint: config.login_hint.clone(),
            popup: config.popup,
            consent_timeout: Duration::from_secs(config.consent_timeout_secs),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("client id is empty; identity client cannot be created".into()));
        }
        if self.login_endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("login endpoint is empty".into()));
        }
        if self.scopes.is_empty() {
            return Err(ConfigError::Invalid("no scopes requested".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsentState {
    pub needs_consent: bool,
}

// =============================================================================
// CALLER
// =============================================================================

pub struct AuthorizedCaller {
    settings: CallerSettings,
    identity: Arc<dyn IdentityClient>,
    host: Arc<dyn ConsentHost>,
    remote: Arc<dyn RemoteFunction>,
    consent: Mutex<ConsentState>,
    consent_cancel: Mutex<CancellationToken>,
    in_flight: tokio::sync::Mutex<()>,
    result_tx: watch::Sender<CallResult>,
}

impl AuthorizedCaller {
    #[must_use]
    pub fn new(
        settings: CallerSettings,
        identity: Arc<dyn IdentityClient>,
        host: Arc<dyn ConsentHost>,
        remote: Arc<dyn RemoteFunction>,
    ) -> Self {
        let (result_tx, _rx) = watch::channel(CallResult::Empty);
        Self {
            settings,
            identity,
            host,
            remote,
            consent: Mutex::new(ConsentState::default()),
            consent_cancel: Mutex::new(CancellationToken::new()),
            in_flight: tokio::sync::Mutex::new(()),
            result_tx,
        }
    }

    #[must_use]
    pub fn consent_state(&self) -> ConsentState {
        *self
            .consent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_needs_consent(&self, value: bool) {
        self.consent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .needs_consent = value;
    }

    /// Latest published result.
    #[must_use]
    pub fn result(&self) -> CallResult {
        self.result_tx.borrow().clone()
    }

    /// Observe result transitions (`Loading` → `Data` / `Empty` / `Error`).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CallResult> {
        self.result_tx.subscribe()
    }

    /// URL the consent surface is pointed at.
    #[must_use]
    pub fn consent_url(&self) -> String {
        consent_url(
            &self.settings.login_endpoint,
            &self.settings.client_id,
            &self.settings.scopes,
            self.settings.login_hint.as_deref(),
        )
    }

    /// Abort the running invocation's consent, whether the popup is already
    /// open or not yet shown.
    pub fn cancel_consent(&self) {
        self.consent_cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .cancel();
    }

    /// Teardown: drop the consent flag and the last result.
    pub fn reset(&self) {
        self.cancel_consent();
        self.set_needs_consent(false);
        self.result_tx.send_replace(CallResult::Empty);
    }

    /// Run the whole flow and publish `Loading` followed by the outcome.
    pub async fn reload(&self) -> CallResult {
        match self.run().await {
            Ok(result) => result,
            Err(e) => CallResult::Error(e.to_string()),
        }
    }

    /// Like [`Self::reload`], but hands back the typed error as well as
    /// publishing its rendering.
    pub async fn run(&self) -> Result<CallResult, CallerError> {
        self.result_tx.send_replace(CallResult::Loading);
        let outcome = self.authorize_and_call().await;
        let result = match &outcome {
            Ok(Value::Null) => CallResult::Empty,
            Ok(value) => CallResult::Data(value.clone()),
            Err(e) => CallResult::Error(e.to_string()),
        };
        self.result_tx.send_replace(result.clone());
        outcome.map(|_| result)
    }

    /// Acquire a token (consenting if needed) and call the function with it.
    pub async fn authorize_and_call(&self) -> Result<Value, CallerError> {
        let _guard = self.in_flight.lock().await;
        let cancel = self.begin_invocation();
        let token = self.acquire(&cancel).await?;
        let value = self
            .remote
            .call(&token.access_token)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "function call failed"))?;
        tracing::info!("function call succeeded");
        Ok(value)
    }

    /// Acquire a token (consenting if needed) without calling the function.
    pub async fn acquire_token(&self) -> Result<AuthResult, CallerError> {
        let _guard = self.in_flight.lock().await;
        let cancel = self.begin_invocation();
        self.acquire(&cancel).await
    }

    /// Acquire a token from the cache or a refresh grant only. Never opens
    /// consent; a failure sets `needs_consent` for the next full invocation.
    pub async fn acquire_token_silent(&self) -> Result<AuthResult, CallerError> {
        let _guard = self.in_flight.lock().await;
        self.settings.validate()?;
        self.host.initialize().await?;
        Ok(self.silent().await?)
    }

    /// Install a fresh cancellation token for the invocation holding `in_flight`.
    fn begin_invocation(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        *self
            .consent_cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = cancel.clone();
        cancel
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<AuthResult, CallerError> {
        self.settings.validate()?;
        self.host.initialize().await?;

        let mut consented = false;
        if self.consent_state().needs_consent {
            tracing::info!("consent still pending from an earlier attempt");
            self.run_consent(cancel).await?;
            consented = true;
        }

        match self.silent().await {
            Ok(result) => return Ok(result),
            Err(e) if consented => return Err(e.into()),
            Err(e) => tracing::info!(error = %e, "silent acquisition failed; consent required"),
        }

        self.run_consent(cancel).await?;
        Ok(self.silent().await?)
    }

    async fn silent(&self) -> Result<AuthResult, IdentityError> {
        let request = SilentRequest { scopes: self.settings.scopes.clone(), account: self.identity.active_account() };
        match self.identity.acquire_token_silent(&request).await {
            Ok(result) => {
                tracing::info!(account = %result.account.username, from_cache = result.from_cache, "silent acquisition succeeded");
                Ok(result)
            }
            Err(e) => {
                self.set_needs_consent(true);
                Err(e)
            }
        }
    }

    async fn run_consent(&self, cancel: &CancellationToken) -> Result<(), ConsentError> {
        if cancel.is_cancelled() {
            tracing::info!("consent cancelled before the popup opened");
            return Err(ConsentError::Cancelled);
        }
        let params = AuthenticateParameters {
            url: self.consent_url(),
            width: self.settings.popup.width,
            height: self.settings.popup.height,
            timeout: self.settings.consent_timeout,
        };

        tracing::info!(url = %params.url, "opening consent");
        let raw = self
            .host
            .authenticate(&params, cancel)
            .await
            .inspect_err(|e| tracing::warn!(error = %e, "consent did not complete"))?;
        let payload =
            parse_consent_payload(&raw).inspect_err(|e| tracing::warn!(error = %e, "consent payload rejected"))?;

        self.identity
            .save_grant(&payload.account, &payload.grant, &self.settings.scopes)
            .await
            .map_err(|e| ConsentError::Store(e.to_string()))?;

        self.set_needs_consent(false);
        tracing::info!(account = %payload.account.username, "consent completed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "caller_test.rs"]
mod tests;
