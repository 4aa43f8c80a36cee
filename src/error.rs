//! Caller error taxonomy.
//!
//! DESIGN
//! ======
//! Every failure inside `authorize_and_call` collapses into one of four
//! closed variants. The view only needs `Display`; the CLI additionally
//! prints the grepable code from [`ErrorCode`].

use crate::config::ConfigError;
use crate::host::ConsentError;
use crate::identity::IdentityError;
use crate::remote::RemoteError;

/// Grepable error codes shared by every error type in the crate.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Errors surfaced by [`crate::caller::AuthorizedCaller`].
#[derive(Debug, thiserror::Error)]
pub enum CallerError {
    /// Missing or invalid configuration, or the host failed to start.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Silent token acquisition failed after the consent retry.
    #[error("silent token acquisition failed: {0}")]
    SilentAuth(#[from] IdentityError),

    /// The interactive consent exchange failed or returned an unusable payload.
    #[error("interactive consent failed: {0}")]
    Consent(#[from] ConsentError),

    /// The function call itself failed.
    #[error("function call failed: {0}")]
    RemoteCall(#[from] RemoteError),
}

impl ErrorCode for CallerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::SilentAuth(e) => e.error_code(),
            Self::Consent(e) => e.error_code(),
            Self::RemoteCall(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Config(e) => e.retryable(),
            Self::SilentAuth(e) => e.retryable(),
            Self::Consent(e) => e.retryable(),
            Self::RemoteCall(e) => e.retryable(),
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
