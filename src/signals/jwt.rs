// src/signals/jwt.rs
// App user id and extra claims from a JWT carried in a cookie or header.
// The signature is not checked; the claims only annotate the risk call.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{Map, Value};

use crate::config::JwtConfig;
use crate::input_validation::{json_path, json_path_str};

const MAX_JWT_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JwtClaims {
    pub app_user_id: Option<String>,
    pub additional_fields: Option<Map<String, Value>>,
}

/// The cookie source is consulted first, then the header.
pub fn extract_claims(
    cfg: &JwtConfig,
    cookie_value: Option<&str>,
    header_value: Option<&str>,
) -> Option<JwtClaims> {
    if let Some(token) = cookie_value.filter(|v| !v.trim().is_empty()) {
        return claims_from_token(
            token,
            cfg.cookie_user_id_field.as_deref(),
            &cfg.cookie_additional_fields,
        );
    }
    let header = header_value?.trim();
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .unwrap_or(header);
    claims_from_token(
        token,
        cfg.header_user_id_field.as_deref(),
        &cfg.header_additional_fields,
    )
}

fn claims_from_token(
    token: &str,
    user_id_field: Option<&str>,
    additional_fields: &[String],
) -> Option<JwtClaims> {
    let payload = match decode_payload(token) {
        Some(payload) => payload,
        None => {
            tracing::debug!("jwt payload could not be decoded");
            return None;
        }
    };

    let app_user_id = user_id_field.and_then(|field| json_path_str(&payload, field));
    let mut extra = Map::new();
    for field in additional_fields {
        if let Some(value) = json_path(&payload, field) {
            extra.insert(field.clone(), value.clone());
        }
    }
    let claims = JwtClaims {
        app_user_id,
        additional_fields: (!extra.is_empty()).then_some(extra),
    };
    if claims == JwtClaims::default() {
        return None;
    }
    Some(claims)
}

pub fn decode_payload(token: &str) -> Option<Value> {
    if token.len() > MAX_JWT_BYTES {
        return None;
    }
    let mut segments = token.trim().split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let value = serde_json::from_slice::<Value>(&bytes).ok()?;
    value.is_object().then_some(value)
}
