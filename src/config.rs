//! Application configuration parsed from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ErrorCode;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_TENANT_ID: &str = "common";
pub const DEFAULT_API_NAME: &str = "myFunc";
pub const DEFAULT_SCOPE: &str = "User.Read";
pub const DEFAULT_DOCS_URL: &str = "https://aka.ms/teamsfx-azure-functions";
pub const DEFAULT_CACHE_PATH: &str = ".tabcaller/msal-cache.json";
pub const DEFAULT_CALLBACK_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_POPUP_WIDTH: u32 = 600;
pub const DEFAULT_POPUP_HEIGHT: u32 = 535;
pub const DEFAULT_CONSENT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configuration errors. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set or empty.
    #[error("missing required setting: env var {var} not set")]
    Missing { var: String },

    /// A value was present but could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),

    /// Settings were assembled but are unusable.
    #[error("invalid settings: {0}")]
    Invalid(String),

    /// The host integration failed its startup step.
    #[error("host initialization failed: {0}")]
    HostInit(String),
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::Parse(_) => "E_CONFIG_PARSE",
            Self::Invalid(_) => "E_CONFIG_INVALID",
            Self::HostInit(_) => "E_HOST_INIT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub client_id: String,
    pub authority_host: String,
    pub tenant_id: String,
    pub initiate_login_endpoint: String,
    pub api_endpoint: String,
    pub api_name: String,
    pub scopes: Vec<String>,
    pub login_hint: Option<String>,
    pub docs_url: Option<String>,
    pub code_path: String,
    pub cache_path: PathBuf,
    pub callback_addr: SocketAddr,
    pub popup: PopupSize,
    pub consent_timeout_secs: u64,
    pub timeouts: HttpTimeouts,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `TAB_CLIENT_ID`
    /// - `TAB_INITIATE_LOGIN_ENDPOINT`
    /// - `TAB_API_ENDPOINT`
    ///
    /// Optional:
    /// - `TAB_API_NAME`: default `myFunc`
    /// - `TAB_AUTHORITY_HOST`, `TAB_TENANT_ID`: authority is `<host>/<tenant>`
    /// - `TAB_SCOPES`: space or comma separated, default `User.Read`
    /// - `TAB_LOGIN_HINT`
    /// - `TAB_DOCS_URL`: empty string disables the docs link
    /// - `TAB_CODE_PATH`: default `api/src/functions/<api name>.ts`
    /// - `TAB_CACHE_PATH`, `TAB_CALLBACK_ADDR`
    /// - `TAB_POPUP_WIDTH`, `TAB_POPUP_HEIGHT`
    /// - `TAB_CONSENT_TIMEOUT_SECS`, `TAB_REQUEST_TIMEOUT_SECS`, `TAB_CONNECT_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let client_id = required("TAB_CLIENT_ID")?;
        let initiate_login_endpoint = required("TAB_INITIATE_LOGIN_ENDPOINT")?;
        let api_endpoint = trim_base_url(&required("TAB_API_ENDPOINT")?);

        let api_name = optional("TAB_API_NAME").unwrap_or_else(|| DEFAULT_API_NAME.to_string());
        let authority_host = trim_base_url(
            &optional("TAB_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
        );
        let tenant_id = optional("TAB_TENANT_ID").unwrap_or_else(|| DEFAULT_TENANT_ID.to_string());
        let scopes = parse_scopes(optional("TAB_SCOPES").as_deref())?;
        let login_hint = optional("TAB_LOGIN_HINT");
        let docs_url = match std::env::var("TAB_DOCS_URL") {
            Ok(v) if v.trim().is_empty() => None,
            Ok(v) => Some(v.trim().to_string()),
            Err(_) => Some(DEFAULT_DOCS_URL.to_string()),
        };
        let code_path = optional("TAB_CODE_PATH").unwrap_or_else(|| default_code_path(&api_name));
        let cache_path = PathBuf::from(optional("TAB_CACHE_PATH").unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string()));
        let callback_addr = parse_callback_addr(optional("TAB_CALLBACK_ADDR").as_deref())?;
        let popup = PopupSize {
            width: env_parse("TAB_POPUP_WIDTH", DEFAULT_POPUP_WIDTH)?,
            height: env_parse("TAB_POPUP_HEIGHT", DEFAULT_POPUP_HEIGHT)?,
        };
        let consent_timeout_secs = env_parse("TAB_CONSENT_TIMEOUT_SECS", DEFAULT_CONSENT_TIMEOUT_SECS)?;
        let timeouts = HttpTimeouts {
            request_secs: env_parse("TAB_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            connect_secs: env_parse("TAB_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        };

        Ok(Self {
            client_id,
            authority_host,
            tenant_id,
            initiate_login_endpoint,
            api_endpoint,
            api_name,
            scopes,
            login_hint,
            docs_url,
            code_path,
            cache_path,
            callback_addr,
            popup,
            consent_timeout_secs,
            timeouts,
        })
    }

    /// Tenant-specific authority URL, e.g. `https://login.microsoftonline.com/common`.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}/{}", self.authority_host, self.tenant_id)
    }

    /// Base URL for function calls, e.g. `https://app.azurewebsites.net/api`.
    #[must_use]
    pub fn functions_base_url(&self) -> String {
        format!("{}/api", self.api_endpoint)
    }
}

#[must_use]
pub fn default_code_path(api_name: &str) -> String {
    format!("api/src/functions/{api_name}.ts")
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::Missing { var: key.to_string() })
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn trim_base_url(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match optional(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::Parse(format!("{key}: invalid value '{raw}'"))),
    }
}

/// Split a scope list on whitespace and commas. `None` yields the default scope.
pub(crate) fn parse_scopes(raw: Option<&str>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(vec![DEFAULT_SCOPE.to_string()]);
    };
    let scopes: Vec<String> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if scopes.is_empty() {
        return Err(ConfigError::Parse("TAB_SCOPES: no scopes listed".into()));
    }
    Ok(scopes)
}

fn parse_callback_addr(raw: Option<&str>) -> Result<SocketAddr, ConfigError> {
    let raw = raw.unwrap_or(DEFAULT_CALLBACK_ADDR);
    raw.parse::<SocketAddr>()
        .map_err(|e| ConfigError::Parse(format!("TAB_CALLBACK_ADDR: '{raw}': {e}")))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
