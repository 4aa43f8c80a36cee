use super::*;

#[test]
fn from_conversions_pick_the_matching_variant() {
    let err: CallerError = ConfigError::Missing { var: "TAB_CLIENT_ID".into() }.into();
    assert!(matches!(err, CallerError::Config(_)));

    let err: CallerError = IdentityError::NoAccount.into();
    assert!(matches!(err, CallerError::SilentAuth(_)));

    let err: CallerError = ConsentError::MissingAccount.into();
    assert!(matches!(err, CallerError::Consent(_)));

    let err: CallerError = RemoteError::Request("connection reset".into()).into();
    assert!(matches!(err, CallerError::RemoteCall(_)));
}

#[test]
fn display_prefixes_the_stage() {
    let err = CallerError::from(ConfigError::Invalid("client id is empty".into()));
    assert_eq!(err.to_string(), "configuration error: invalid settings: client id is empty");

    let err = CallerError::from(IdentityError::InteractionRequired("no cached token".into()));
    assert_eq!(err.to_string(), "silent token acquisition failed: interaction required: no cached token");

    let err = CallerError::from(ConsentError::Timeout { secs: 300 });
    assert_eq!(err.to_string(), "interactive consent failed: consent timed out after 300s");

    let err = CallerError::from(RemoteError::Status { status: 404, body: "not found".into() });
    assert_eq!(err.to_string(), "function call failed: status 404: not found");
}

#[test]
fn error_code_delegates_to_inner() {
    assert_eq!(CallerError::from(ConfigError::HostInit("x".into())).error_code(), "E_HOST_INIT");
    assert_eq!(CallerError::from(IdentityError::NoAccount).error_code(), "E_NO_ACCOUNT");
    assert_eq!(CallerError::from(ConsentError::Cancelled).error_code(), "E_CONSENT_CANCELLED");
    assert_eq!(
        CallerError::from(RemoteError::Status { status: 500, body: String::new() }).error_code(),
        "E_REMOTE_STATUS"
    );
}

#[test]
fn retryable_delegates_to_inner() {
    assert!(!CallerError::from(ConfigError::Parse("x".into())).retryable());
    assert!(CallerError::from(IdentityError::Request("dns".into())).retryable());
    assert!(!CallerError::from(ConsentError::MissingAccount).retryable());
    assert!(CallerError::from(RemoteError::Status { status: 429, body: String::new() }).retryable());
}
