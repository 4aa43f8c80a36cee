use super::*;
use std::sync::Mutex;

// Env is process-global; config tests take this lock for their duration.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ALL_VARS: &[&str] = &[
    "TAB_CLIENT_ID",
    "TAB_INITIATE_LOGIN_ENDPOINT",
    "TAB_API_ENDPOINT",
    "TAB_API_NAME",
    "TAB_AUTHORITY_HOST",
    "TAB_TENANT_ID",
    "TAB_SCOPES",
    "TAB_LOGIN_HINT",
    "TAB_DOCS_URL",
    "TAB_CODE_PATH",
    "TAB_CACHE_PATH",
    "TAB_CALLBACK_ADDR",
    "TAB_POPUP_WIDTH",
    "TAB_POPUP_HEIGHT",
    "TAB_CONSENT_TIMEOUT_SECS",
    "TAB_REQUEST_TIMEOUT_SECS",
    "TAB_CONNECT_TIMEOUT_SECS",
];

/// # Safety
/// Callers must hold `ENV_LOCK`.
unsafe fn clear_tab_env() {
    for var in ALL_VARS {
        unsafe { std::env::remove_var(var) };
    }
}

/// # Safety
/// Callers must hold `ENV_LOCK`.
unsafe fn set_required() {
    unsafe {
        std::env::set_var("TAB_CLIENT_ID", "11111111-2222-3333-4444-555555555555");
        std::env::set_var("TAB_INITIATE_LOGIN_ENDPOINT", "https://tab.example.test/auth-start.html");
        std::env::set_var("TAB_API_ENDPOINT", "https://func.example.test/");
    }
}

#[test]
fn from_env_applies_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_tab_env();
        set_required();
    }

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.api_endpoint, "https://func.example.test");
    assert_eq!(cfg.api_name, DEFAULT_API_NAME);
    assert_eq!(cfg.authority(), "https://login.microsoftonline.com/common");
    assert_eq!(cfg.functions_base_url(), "https://func.example.test/api");
    assert_eq!(cfg.scopes, vec!["User.Read".to_string()]);
    assert_eq!(cfg.login_hint, None);
    assert_eq!(cfg.docs_url.as_deref(), Some(DEFAULT_DOCS_URL));
    assert_eq!(cfg.code_path, "api/src/functions/myFunc.ts");
    assert_eq!(cfg.cache_path, PathBuf::from(DEFAULT_CACHE_PATH));
    assert_eq!(cfg.callback_addr.to_string(), DEFAULT_CALLBACK_ADDR);
    assert_eq!(cfg.popup, PopupSize { width: 600, height: 535 });
    assert_eq!(cfg.consent_timeout_secs, DEFAULT_CONSENT_TIMEOUT_SECS);
    assert_eq!(
        cfg.timeouts,
        HttpTimeouts { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    );

    unsafe { clear_tab_env() };
}

#[test]
fn from_env_parses_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_tab_env();
        set_required();
        std::env::set_var("TAB_API_NAME", "getUserProfile");
        std::env::set_var("TAB_AUTHORITY_HOST", "https://login.example.test/");
        std::env::set_var("TAB_TENANT_ID", "contoso.onmicrosoft.com");
        std::env::set_var("TAB_SCOPES", "User.Read, Mail.Read offline_access");
        std::env::set_var("TAB_LOGIN_HINT", "adele@contoso.com");
        std::env::set_var("TAB_DOCS_URL", "");
        std::env::set_var("TAB_CALLBACK_ADDR", "127.0.0.1:8123");
        std::env::set_var("TAB_POPUP_WIDTH", "800");
        std::env::set_var("TAB_CONSENT_TIMEOUT_SECS", "45");
        std::env::set_var("TAB_REQUEST_TIMEOUT_SECS", "5");
        std::env::set_var("TAB_CONNECT_TIMEOUT_SECS", "2");
    }

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.authority(), "https://login.example.test/contoso.onmicrosoft.com");
    assert_eq!(cfg.scopes, vec!["User.Read", "Mail.Read", "offline_access"]);
    assert_eq!(cfg.login_hint.as_deref(), Some("adele@contoso.com"));
    assert_eq!(cfg.docs_url, None);
    assert_eq!(cfg.code_path, "api/src/functions/getUserProfile.ts");
    assert_eq!(cfg.callback_addr.port(), 8123);
    assert_eq!(cfg.popup, PopupSize { width: 800, height: DEFAULT_POPUP_HEIGHT });
    assert_eq!(cfg.consent_timeout_secs, 45);
    assert_eq!(cfg.timeouts, HttpTimeouts { request_secs: 5, connect_secs: 2 });

    unsafe { clear_tab_env() };
}

#[test]
fn from_env_missing_client_id_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_tab_env();
        set_required();
        std::env::set_var("TAB_CLIENT_ID", "   ");
    }

    let err = AppConfig::from_env().unwrap_err();
    assert!(matches!(&err, ConfigError::Missing { var } if var == "TAB_CLIENT_ID"));
    assert_eq!(err.error_code(), "E_CONFIG_MISSING");

    unsafe { clear_tab_env() };
}

#[test]
fn from_env_bad_number_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_tab_env();
        set_required();
        std::env::set_var("TAB_POPUP_HEIGHT", "tall");
    }

    let err = AppConfig::from_env().unwrap_err().to_string();
    assert!(err.contains("TAB_POPUP_HEIGHT"));

    unsafe { clear_tab_env() };
}

#[test]
fn from_env_bad_callback_addr_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        clear_tab_env();
        set_required();
        std::env::set_var("TAB_CALLBACK_ADDR", "localhost");
    }

    let err = AppConfig::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    unsafe { clear_tab_env() };
}

// =============================================================================
// parse_scopes
// =============================================================================

#[test]
fn parse_scopes_defaults_to_user_read() {
    assert_eq!(parse_scopes(None).unwrap(), vec!["User.Read"]);
}

#[test]
fn parse_scopes_only_separators_errors() {
    assert!(parse_scopes(Some(" , ,")).is_err());
}
