// src/signals/original_token.rs
// Retained pre-refresh mobile token: parsed for audit, never gates a decision.

use crate::context::{split_mobile_token, OriginalTokenError, RiskContext};
use crate::payload::{build_payload, PayloadCodec, PayloadKind, SignatureContext, COOKIE_V3_NAME};

/// Populates `original_uuid`/`decoded_original_token` (and `vid` when the
/// request carried none), or `original_token_error`. Field extraction runs
/// before the signature check so a forged token still yields its ids.
pub fn validate_original_token(ctx: &mut RiskContext, codec: PayloadCodec<'_>) {
    let Some(raw) = ctx.original_token.clone() else {
        return;
    };
    let (name, token) = split_mobile_token(&raw);
    let kind = PayloadKind::select(name == COOKIE_V3_NAME, true);
    let mut payload = build_payload(kind, token, codec, SignatureContext::default());

    if !payload.deserialize() {
        tracing::debug!(request_id = ctx.request_id.as_str(), "original token decryption failed");
        ctx.original_token_error = Some(OriginalTokenError::DecryptionFailed);
        return;
    }
    ctx.original_uuid = Some(payload.uuid().to_string());
    ctx.decoded_original_token = payload.decoded().map(|decoded| decoded.body.clone());
    if ctx.vid.is_none() {
        ctx.vid = Some(payload.vid().to_string());
        ctx.vid_source = Some("original_token");
    }
    if let Err(err) = payload.verify() {
        tracing::debug!(
            request_id = ctx.request_id.as_str(),
            error = %err,
            "original token validation failed"
        );
        ctx.original_token_error = Some(OriginalTokenError::ValidationFailed);
    }
}
