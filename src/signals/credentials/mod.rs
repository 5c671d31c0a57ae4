// src/signals/credentials/mod.rs
// Login credential extraction for credentials intelligence.

use serde_json::Value;

use crate::config::{CredentialsExtractionRule, EnforcerConfig, SentThrough};
use crate::context::{LoginCredentialsFields, RequestFacts};
use crate::input_validation::{
    json_path_str, parse_form_body, parse_json_body, query_param, MAX_LOGIN_BODY_BYTES,
};

mod protocol;

pub use protocol::{
    normalize_username, protocol_for, CredentialsProtocol, MultistepSsoProtocol, V1Protocol,
    V2Protocol,
};

/// Matches the login rule for this request, pulls the configured fields and
/// hashes them with the configured protocol version.
pub fn extract_credentials(
    facts: &RequestFacts,
    cfg: &EnforcerConfig,
) -> Option<LoginCredentialsFields> {
    if !cfg.ci_enabled {
        return None;
    }
    let rule = find_rule(&cfg.credentials_extraction, facts)?;
    let (username, password) = extract_fields(facts, rule);
    let fields = protocol_for(cfg.ci_version).process(username.as_deref(), password.as_deref());
    if fields.is_none() {
        tracing::debug!(
            path = rule.path.as_str(),
            ci_version = cfg.ci_version.as_str(),
            has_user = username.is_some(),
            has_pass = password.is_some(),
            "credentials extraction incomplete"
        );
    }
    fields
}

fn find_rule<'a>(
    rules: &'a [CredentialsExtractionRule],
    facts: &RequestFacts,
) -> Option<&'a CredentialsExtractionRule> {
    let path = facts.path();
    rules
        .iter()
        .find(|rule| rule.path == path && rule.method.eq_ignore_ascii_case(&facts.method))
}

fn extract_fields(
    facts: &RequestFacts,
    rule: &CredentialsExtractionRule,
) -> (Option<String>, Option<String>) {
    let (username, password) = match rule.sent_through {
        SentThrough::Header => (
            facts.header(&rule.user_field).map(str::to_string),
            facts.header(&rule.pass_field).map(str::to_string),
        ),
        SentThrough::QueryParam => (
            query_param(facts.query(), &rule.user_field),
            query_param(facts.query(), &rule.pass_field),
        ),
        SentThrough::Body => body_fields(facts, rule),
    };
    (non_empty(username), non_empty(password))
}

fn body_fields(
    facts: &RequestFacts,
    rule: &CredentialsExtractionRule,
) -> (Option<String>, Option<String>) {
    let content_type = facts
        .header("content-type")
        .unwrap_or("")
        .to_ascii_lowercase();
    if content_type.contains("application/x-www-form-urlencoded") {
        return match parse_form_body(&facts.body, MAX_LOGIN_BODY_BYTES) {
            Ok(pairs) => {
                let lookup = |field: &str| {
                    pairs
                        .iter()
                        .find(|(key, _)| key == field)
                        .map(|(_, value)| value.clone())
                };
                (lookup(&rule.user_field), lookup(&rule.pass_field))
            }
            Err(err) => {
                tracing::debug!(error = err, "login form body not parsed");
                (None, None)
            }
        };
    }
    match parse_json_body(&facts.body, MAX_LOGIN_BODY_BYTES) {
        Ok(document @ Value::Object(_)) => (
            json_path_str(&document, &rule.user_field),
            json_path_str(&document, &rule.pass_field),
        ),
        Ok(_) => (None, None),
        Err(err) => {
            tracing::debug!(error = err, "login json body not parsed");
            (None, None)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
