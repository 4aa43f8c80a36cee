use super::*;

// =============================================================================
// consent_url
// =============================================================================

#[test]
fn consent_url_matches_login_endpoint_contract() {
    let url = consent_url(
        "https://tab.example.test/auth-start.html",
        "11111111-2222-3333-4444-555555555555",
        &["User.Read".to_string()],
        Some("adele@contoso.com"),
    );
    assert_eq!(
        url,
        "https://tab.example.test/auth-start.html?clientId=11111111-2222-3333-4444-555555555555&scope=User.Read&loginHint=adele%40contoso.com"
    );
}

#[test]
fn consent_url_encodes_multiple_scopes() {
    let scopes = vec!["User.Read".to_string(), "Mail.Read".to_string()];
    let url = consent_url("https://tab.example.test/start", "cid", &scopes, None);
    assert_eq!(url, "https://tab.example.test/start?clientId=cid&scope=User.Read%20Mail.Read");
}

#[test]
fn consent_url_appends_to_existing_query() {
    let url = consent_url("https://tab.example.test/start?v=2", "cid", &["User.Read".to_string()], None);
    assert!(url.starts_with("https://tab.example.test/start?v=2&clientId=cid&"));
}

// =============================================================================
// parse_consent_payload
// =============================================================================

#[test]
fn parse_payload_with_account_only() {
    let raw = serde_json::json!({
        "account": {
            "homeAccountId": "uid.utid",
            "environment": "login.microsoftonline.com",
            "tenantId": "utid",
            "username": "adele@contoso.com",
            "localAccountId": "uid"
        }
    })
    .to_string();
    let payload = parse_consent_payload(&raw).unwrap();
    assert_eq!(payload.account.home_account_id, "uid.utid");
    assert_eq!(payload.grant, TokenGrant::default());
}

#[test]
fn parse_payload_with_tokens() {
    let raw = serde_json::json!({
        "account": { "homeAccountId": "uid.utid", "username": "adele@contoso.com" },
        "accessToken": "at-1",
        "refreshToken": "rt-1",
        "expiresIn": "3599",
        "scope": "User.Read openid"
    })
    .to_string();
    let payload = parse_consent_payload(&raw).unwrap();
    assert_eq!(payload.grant.access_token.as_deref(), Some("at-1"));
    assert_eq!(payload.grant.refresh_token.as_deref(), Some("rt-1"));
    assert_eq!(payload.grant.expires_in, Some(3599));
    assert_eq!(payload.grant.scopes, vec!["User.Read", "openid"]);
}

#[test]
fn parse_payload_missing_account() {
    let err = parse_consent_payload(r#"{"accessToken":"at-1"}"#).unwrap_err();
    assert!(matches!(err, ConsentError::MissingAccount));
}

#[test]
fn parse_payload_null_account() {
    let err = parse_consent_payload(r#"{"account":null}"#).unwrap_err();
    assert!(matches!(err, ConsentError::MissingAccount));
}

#[test]
fn parse_payload_not_json() {
    let err = parse_consent_payload("CancelledByUser").unwrap_err();
    assert!(matches!(err, ConsentError::MalformedPayload(_)));
    assert_eq!(err.error_code(), "E_CONSENT_MALFORMED");
}

#[test]
fn parse_payload_account_wrong_shape() {
    let err = parse_consent_payload(r#"{"account":"adele@contoso.com"}"#).unwrap_err();
    assert!(matches!(err, ConsentError::MalformedPayload(ref msg) if msg.starts_with("account:")));
}

// =============================================================================
// HostSignal
// =============================================================================

#[tokio::test]
async fn host_signal_starts_pending() {
    let signal = HostSignal::new();
    assert_eq!(signal.status(), HostStatus::Pending);
}

#[tokio::test]
async fn host_signal_wakes_waiter_on_ready() {
    let signal = std::sync::Arc::new(HostSignal::new());
    let waiter = {
        let signal = signal.clone();
        tokio::spawn(async move { signal.wait_ready().await })
    };
    tokio::task::yield_now().await;
    signal.mark_ready();
    assert!(waiter.await.unwrap().is_ok());
}

#[tokio::test]
async fn host_signal_reports_failure() {
    let signal = HostSignal::new();
    signal.mark_failed("address in use");
    let err = signal.wait_ready().await.unwrap_err();
    assert!(matches!(err, ConfigError::HostInit(ref r) if r == "address in use"));
}
