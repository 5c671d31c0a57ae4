// src/signals/cookie.rs
// Cookie evaluator: classifies the request's PX cookie/token evidence.

use std::panic::{self, AssertUnwindSafe};

use crate::config::EnforcerConfig;
use crate::context::{BlockAction, CallReason, RiskContext};
use crate::error::RiskError;
use crate::payload::{build_payload, PayloadCodec, PayloadKind, SignatureContext, COOKIE_V3_NAME};
use crate::signals::original_token::validate_original_token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieOutcome {
    NoCookie,
    MobileNoToken,
    MobileConnectionError,
    MobilePinningError,
    CookieInvalid,
    CookieExpired,
    BadScore,
    GoodScore,
    SensitiveRoute,
    UnexpectedResult,
}

impl CookieOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CookieOutcome::NoCookie => "no_cookie",
            CookieOutcome::MobileNoToken => "mobile_no_token",
            CookieOutcome::MobileConnectionError => "mobile_connection_error",
            CookieOutcome::MobilePinningError => "mobile_pinning_error",
            CookieOutcome::CookieInvalid => "cookie_invalid",
            CookieOutcome::CookieExpired => "cookie_expired",
            CookieOutcome::BadScore => "bad_score",
            CookieOutcome::GoodScore => "good_score",
            CookieOutcome::SensitiveRoute => "sensitive_route",
            CookieOutcome::UnexpectedResult => "unexpected_result",
        }
    }
}

/// Runs the evaluation; a panic anywhere inside becomes `UnexpectedResult`.
pub fn evaluate_cookie(ctx: &mut RiskContext, cfg: &EnforcerConfig, now_ms: i64) -> CookieOutcome {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| classify(ctx, cfg, now_ms)));
    match outcome {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::error!(
                request_id = ctx.request_id.as_str(),
                "cookie evaluation panicked"
            );
            CookieOutcome::UnexpectedResult
        }
    }
}

fn mobile_sentinel(value: &str) -> Option<(CookieOutcome, CallReason)> {
    match value {
        "1" => Some((CookieOutcome::MobileNoToken, CallReason::MobileNoToken)),
        "2" => Some((
            CookieOutcome::MobileConnectionError,
            CallReason::MobileConnectionError,
        )),
        "3" => Some((
            CookieOutcome::MobilePinningError,
            CallReason::MobilePinningError,
        )),
        _ => None,
    }
}

fn classify(ctx: &mut RiskContext, cfg: &EnforcerConfig, now_ms: i64) -> CookieOutcome {
    let Some((name, raw)) = ctx
        .primary_cookie()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
    else {
        ctx.call_reason = Some(CallReason::NoCookie);
        return CookieOutcome::NoCookie;
    };

    let Some(codec) = PayloadCodec::from_config(cfg) else {
        tracing::warn!(
            request_id = ctx.request_id.as_str(),
            error = %RiskError::ConfigurationMissing("cookie_secret"),
            "cookie evaluation skipped"
        );
        ctx.call_reason = Some(CallReason::NoCookieKey);
        return CookieOutcome::UnexpectedResult;
    };

    if ctx.is_mobile() {
        if let Some((outcome, reason)) = mobile_sentinel(&raw) {
            ctx.call_reason = Some(reason);
            validate_original_token(ctx, codec);
            return outcome;
        }
    }

    let kind = PayloadKind::select(name == COOKIE_V3_NAME, ctx.is_mobile());
    let (user_agent, ip) = (ctx.user_agent.clone(), ctx.ip.clone());
    let signature = SignatureContext {
        user_agent: &user_agent,
        ip: &ip,
    };
    let mut payload = build_payload(kind, &raw, codec, signature);

    if !payload.deserialize() {
        ctx.call_reason = Some(CallReason::CookieDecryptionFailed);
        ctx.px_orig_cookie = Some(raw);
        return CookieOutcome::CookieInvalid;
    }

    ctx.score = Some(payload.score());
    ctx.uuid = Some(payload.uuid().to_string());
    ctx.vid = Some(payload.vid().to_string());
    ctx.vid_source = Some("risk_cookie");
    ctx.cookie_hmac = Some(payload.hmac().to_string());
    ctx.decoded_cookie = payload.decoded().map(|decoded| decoded.body.clone());
    ctx.block_action = Some(BlockAction::from_code(payload.block_action()));

    if payload.is_expired(now_ms) {
        tracing::debug!(
            request_id = ctx.request_id.as_str(),
            error = %RiskError::Expired,
            expires_ms = payload.decoded().map(|decoded| decoded.time_ms),
            "cookie not usable"
        );
        ctx.call_reason = Some(CallReason::CookieExpired);
        return CookieOutcome::CookieExpired;
    }
    if payload.is_high_score(i64::from(cfg.blocking_score)) {
        return CookieOutcome::BadScore;
    }
    if !payload.is_secure() {
        ctx.call_reason = Some(CallReason::CookieValidationFailed);
        return CookieOutcome::CookieInvalid;
    }
    if ctx.sensitive_route {
        ctx.call_reason = Some(CallReason::SensitiveRoute);
        return CookieOutcome::SensitiveRoute;
    }
    CookieOutcome::GoodScore
}
