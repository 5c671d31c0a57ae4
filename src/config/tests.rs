use super::*;
use std::collections::HashMap;

fn env_lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn empty_json_yields_defaults() {
    let cfg = EnforcerConfig::from_json(b"{}").unwrap();
    assert_eq!(cfg.blocking_score, 100);
    assert_eq!(cfg.module_mode, ModuleMode::Monitor);
    assert_eq!(cfg.api_timeout_ms, 1_000);
    assert!(cfg.encryption_enabled);
    assert_eq!(cfg.ci_version, CiProtocolVersion::V2);
    assert!(cfg.cookie_secret().is_none());
    assert!(cfg.is_graphql_route("/graphql"));
    assert!(cfg.is_sensitive_header("Cookie"));
}

#[test]
fn out_of_range_tunables_are_clamped() {
    let cfg = EnforcerConfig::from_json(br#"{"blocking_score": 250, "api_timeout_ms": 5}"#)
        .unwrap();
    assert_eq!(cfg.blocking_score, 100);
    assert_eq!(cfg.api_timeout_ms, API_TIMEOUT_MS_MIN);

    let cfg = EnforcerConfig::from_json(br#"{"api_timeout_ms": 999999}"#).unwrap();
    assert_eq!(cfg.api_timeout_ms, API_TIMEOUT_MS_MAX);
}

#[test]
fn blank_secret_is_treated_as_missing() {
    let cfg = EnforcerConfig::from_json(br#"{"cookie_secret": "  "}"#).unwrap();
    assert!(cfg.cookie_secret().is_none());

    let cfg = EnforcerConfig::from_json(br#"{"cookie_secret": "s3cret"}"#).unwrap();
    assert_eq!(cfg.cookie_secret(), Some("s3cret"));
}

#[test]
fn secrets_are_redacted_in_debug_output() {
    let cfg = EnforcerConfig::from_json(br#"{"cookie_secret": "do-not-print"}"#).unwrap();
    assert!(!format!("{:?}", cfg).contains("do-not-print"));
}

#[test]
fn routes_accept_prefix_and_regex_entries() {
    let cfg = EnforcerConfig::from_json(
        br#"{"sensitive_routes": ["/login", {"regex": "^/account/[0-9]+$"}]}"#,
    )
    .unwrap();
    assert!(cfg.is_sensitive_route("/login"));
    assert!(cfg.is_sensitive_route("/login/sso?next=/"));
    assert!(cfg.is_sensitive_route("/account/42"));
    assert!(!cfg.is_sensitive_route("/account/abc"));
    assert!(!cfg.is_sensitive_route("/"));
}

#[test]
fn invalid_route_regex_fails_load() {
    let err = EnforcerConfig::from_json(br#"{"whitelist_routes": [{"regex": "(unclosed"}]}"#)
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::InvalidJson(_)));
}

#[test]
fn unsupported_cipher_is_rejected() {
    let err = EnforcerConfig::from_json(br#"{"key_derivation": {"cipher": "des-ede3-cbc"}}"#)
        .unwrap_err();
    assert_eq!(err, ConfigLoadError::UnsupportedCipher("des-ede3-cbc".to_string()));

    let err = EnforcerConfig::from_json(br#"{"key_derivation": {"key_len": 16}}"#).unwrap_err();
    assert_eq!(
        err,
        ConfigLoadError::InvalidKeyDerivation {
            key_len: 16,
            iv_len: 16
        }
    );
}

#[test]
fn env_overrides_replace_secrets_and_mode() {
    let mut cfg = EnforcerConfig::from_json(br#"{"app_id": "PXjson"}"#).unwrap();
    cfg.apply_env_overrides_with(env_lookup(&[
        ("PX_APP_ID", "PXenv"),
        ("PX_COOKIE_SECRET", "env-secret"),
        ("PX_AUTH_TOKEN", "env-token"),
        ("PX_MODULE_MODE", "active_blocking"),
        ("PX_BLOCKING_SCORE", "70"),
    ]))
    .unwrap();
    assert_eq!(cfg.app_id, "PXenv");
    assert_eq!(cfg.cookie_secret(), Some("env-secret"));
    assert_eq!(cfg.auth_token(), Some("env-token"));
    assert_eq!(cfg.module_mode, ModuleMode::ActiveBlocking);
    assert_eq!(cfg.blocking_score, 70);
}

#[test]
fn invalid_module_mode_env_is_an_error() {
    let mut cfg = EnforcerConfig::default();
    let err = cfg
        .apply_env_overrides_with(env_lookup(&[("PX_MODULE_MODE", "loud")]))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::InvalidEnv { name: "PX_MODULE_MODE", .. }));
}

#[test]
fn parse_blocking_score_clamps_and_ignores_junk() {
    assert_eq!(parse_blocking_score(None, 100), 100);
    assert_eq!(parse_blocking_score(Some("junk"), 90), 90);
    assert_eq!(parse_blocking_score(Some("500"), 90), 100);
    assert_eq!(parse_blocking_score(Some(" 60 "), 90), 60);
}

#[test]
fn risk_api_url_defaults_to_app_backend() {
    let cfg = EnforcerConfig::from_json(br#"{"app_id": "PXabc123"}"#).unwrap();
    assert_eq!(cfg.risk_api_url(), "https://sapi-pxabc123.perimeterx.net/api/v3/risk");

    let cfg =
        EnforcerConfig::from_json(br#"{"backend_url": "http://127.0.0.1:8080/"}"#).unwrap();
    assert_eq!(cfg.risk_api_url(), "http://127.0.0.1:8080/api/v3/risk");
}

#[test]
fn filters_match_user_agent_substrings_and_cidrs() {
    let cfg = EnforcerConfig::from_json(
        br#"{"filter_by_user_agent": ["HealthChecker"], "filter_by_ip": ["10.0.0.0/8", "192.0.2.7"]}"#,
    )
    .unwrap();
    assert!(cfg.is_filtered_user_agent("Mozilla/5.0 (healthchecker/2.1)"));
    assert!(!cfg.is_filtered_user_agent("Mozilla/5.0"));
    assert!(cfg.is_filtered_ip("10.20.30.40"));
    assert!(cfg.is_filtered_ip("192.0.2.7"));
    assert!(!cfg.is_filtered_ip("192.0.2.8"));
    assert!(!cfg.is_filtered_ip("not-an-ip"));
}

#[test]
fn invalid_ip_filter_fails_load() {
    assert!(EnforcerConfig::from_json(br#"{"filter_by_ip": ["10.0.0.0/99"]}"#).is_err());
}
