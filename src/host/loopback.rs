//! Loopback consent surface for hosts without an embedded browser.
//!
//! The consent URL is announced (logged, or handed to a custom announcer such
//! as the CLI's stderr prompt) and a short-lived HTTP listener waits on the
//! callback address for the login page's result:
//!
//! - `GET /auth-end?result=<payload>`
//! - `POST /auth-end` with the raw payload as body
//! - `GET /auth-end?error=<reason>`
//!
//! The first delivery wins; the listener is shut down once the exchange ends.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use super::{AuthenticateParameters, ConsentError, ConsentHost, HostSignal, HostStatus};
use crate::config::ConfigError;

pub const CALLBACK_PATH: &str = "/auth-end";
const CLOSE_MESSAGE: &str = "Consent complete. You can close this window.";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Everything a user needs to open the consent popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentPrompt {
    pub url: String,
    pub callback_url: String,
    pub width: u32,
    pub height: u32,
}

pub type Announcer = Arc<dyn Fn(&ConsentPrompt) + Send + Sync>;

pub struct LoopbackHost {
    callback_addr: SocketAddr,
    signal: HostSignal,
    announce: Announcer,
}

impl LoopbackHost {
    #[must_use]
    pub fn new(callback_addr: SocketAddr) -> Self {
        Self { callback_addr, signal: HostSignal::new(), announce: Arc::new(log_prompt) }
    }

    /// Replace the default (tracing) announcer.
    #[must_use]
    pub fn with_announcer(mut self, announce: Announcer) -> Self {
        self.announce = announce;
        self
    }

    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("http://{}{CALLBACK_PATH}", self.callback_addr)
    }

    #[must_use]
    pub fn signal(&self) -> &HostSignal {
        &self.signal
    }
}

fn log_prompt(prompt: &ConsentPrompt) {
    tracing::info!(
        url = %prompt.url,
        callback = %prompt.callback_url,
        width = prompt.width,
        height = prompt.height,
        "open the consent page to continue"
    );
}

#[async_trait::async_trait]
impl ConsentHost for LoopbackHost {
    async fn initialize(&self) -> Result<(), ConfigError> {
        if self.signal.status() != HostStatus::Ready {
            // Probe the callback address so a busy port fails at startup, not mid-consent.
            match TcpListener::bind(self.callback_addr).await {
                Ok(listener) => {
                    drop(listener);
                    tracing::debug!(addr = %self.callback_addr, "loopback host ready");
                    self.signal.mark_ready();
                }
                Err(e) => {
                    tracing::error!(addr = %self.callback_addr, error = %e, "loopback host failed to start");
                    self.signal.mark_failed(format!("{}: {e}", self.callback_addr));
                }
            }
        }
        self.signal.wait_ready().await
    }

    async fn authenticate(
        &self,
        params: &AuthenticateParameters,
        cancel: &CancellationToken,
    ) -> Result<String, ConsentError> {
        if self.signal.status() != HostStatus::Ready {
            return Err(ConsentError::Host("host not initialized".into()));
        }
        let listener = TcpListener::bind(self.callback_addr)
            .await
            .map_err(|e| ConsentError::Host(format!("{}: {e}", self.callback_addr)))?;

        (self.announce)(&ConsentPrompt {
            url: params.url.clone(),
            callback_url: self.callback_url(),
            width: params.width,
            height: params.height,
        });

        await_consent(listener, params.timeout, cancel).await
    }
}

// =============================================================================
// CALLBACK LISTENER
// =============================================================================

#[derive(Debug)]
enum CallbackOutcome {
    Payload(String),
    Failure(String),
}

#[derive(Clone)]
struct CallbackSlot(Arc<Mutex<Option<oneshot::Sender<CallbackOutcome>>>>);

impl CallbackSlot {
    fn deliver(&self, outcome: CallbackOutcome) -> (StatusCode, &'static str) {
        let sender = self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(outcome);
                (StatusCode::OK, CLOSE_MESSAGE)
            }
            None => (StatusCode::CONFLICT, "consent already completed"),
        }
    }
}

#[derive(Deserialize)]
struct CallbackQuery {
    result: Option<String>,
    error: Option<String>,
}

async fn callback_query(
    State(slot): State<CallbackSlot>,
    Query(query): Query<CallbackQuery>,
) -> (StatusCode, &'static str) {
    match (query.result, query.error) {
        (Some(payload), _) => slot.deliver(CallbackOutcome::Payload(payload)),
        (None, Some(reason)) => slot.deliver(CallbackOutcome::Failure(reason)),
        (None, None) => (StatusCode::BAD_REQUEST, "missing result"),
    }
}

async fn callback_body(State(slot): State<CallbackSlot>, body: String) -> (StatusCode, &'static str) {
    if body.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "empty payload");
    }
    slot.deliver(CallbackOutcome::Payload(body))
}

/// Serve the callback route on `listener` until a result arrives, the
/// deadline passes, or `cancel` fires.
pub(crate) async fn await_consent(
    listener: TcpListener,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String, ConsentError> {
    let (tx, rx) = oneshot::channel();
    let slot = CallbackSlot(Arc::new(Mutex::new(Some(tx))));
    let app = Router::new()
        .route(CALLBACK_PATH, get(callback_query).post(callback_body))
        .layer(TraceLayer::new_for_http())
        .with_state(slot);

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        }
    });

    let outcome = tokio::select! {
        received = rx => received.map_err(|_| ConsentError::Host("callback listener stopped".into())),
        () = tokio::time::sleep(timeout) => Err(ConsentError::Timeout { secs: timeout.as_secs() }),
        () = cancel.cancelled() => Err(ConsentError::Cancelled),
    };

    shutdown.cancel();
    match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "callback listener exited with error"),
        Ok(Err(e)) => tracing::warn!(error = %e, "callback listener task failed"),
        Err(_) => {
            tracing::warn!("callback listener did not shut down in time; aborting");
            server.abort();
            // Wait for the abort so the port is released before returning.
            let _ = server.await;
        }
        Ok(Ok(Ok(()))) => {}
    }

    match outcome? {
        CallbackOutcome::Payload(payload) => Ok(payload),
        CallbackOutcome::Failure(reason) => Err(ConsentError::Failure(reason)),
    }
}

#[cfg(test)]
#[path = "loopback_test.rs"]
mod tests;
