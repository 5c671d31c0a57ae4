// src/payload/mod.rs
// Risk cookie/token payloads: four wire variants behind one capability trait.

use serde_json::Value;

use crate::config::{EnforcerConfig, HashDigest, KeyDerivation};
use crate::error::RiskError;

mod cookie_v1;
mod cookie_v3;
mod token_v1;
mod token_v3;

pub use cookie_v1::CookieV1;
pub use cookie_v3::CookieV3;
pub use token_v1::TokenV1;
pub use token_v3::TokenV3;

pub const COOKIE_V1_NAME: &str = "_px";
pub const COOKIE_V3_NAME: &str = "_px3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    CookieV1,
    CookieV3,
    TokenV1,
    TokenV3,
}

impl PayloadKind {
    /// v3 wins whenever its cookie name is present; mobile-SDK evidence
    /// selects the token flavour of the same version.
    pub const fn select(has_v3_cookie: bool, mobile_origin: bool) -> Self {
        match (has_v3_cookie, mobile_origin) {
            (true, false) => PayloadKind::CookieV3,
            (false, false) => PayloadKind::CookieV1,
            (true, true) => PayloadKind::TokenV3,
            (false, true) => PayloadKind::TokenV1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PayloadKind::CookieV1 => "cookie_v1",
            PayloadKind::CookieV3 => "cookie_v3",
            PayloadKind::TokenV1 => "token_v1",
            PayloadKind::TokenV3 => "token_v3",
        }
    }
}

/// Read-only key material and decoding switches for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec<'a> {
    secret: &'a str,
    encryption_enabled: bool,
    key_derivation: &'a KeyDerivation,
    hmac_digest: HashDigest,
}

impl<'a> PayloadCodec<'a> {
    /// `None` when no cookie secret is configured.
    pub fn from_config(cfg: &'a EnforcerConfig) -> Option<Self> {
        let secret = cfg.cookie_secret()?;
        Some(Self {
            secret,
            encryption_enabled: cfg.encryption_enabled,
            key_derivation: &cfg.key_derivation,
            hmac_digest: cfg.hmac_digest,
        })
    }

    fn open(&self, encoded: &str) -> Result<Value, RiskError> {
        if self.encryption_enabled {
            crate::crypto::decrypt_cookie(encoded, self.secret, self.key_derivation)
        } else {
            crate::crypto::decode_base64_json(encoded)
        }
    }

    fn signature_matches(&self, canonical: &str, expected_hmac: &str) -> bool {
        crate::crypto::hmac_matches(self.hmac_digest, self.secret, canonical, expected_hmac)
    }
}

/// Request facts a cookie signature may cover besides the payload itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureContext<'a> {
    pub user_agent: &'a str,
    pub ip: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPayload {
    pub body: Value,
    pub time_ms: i64,
    pub score: i64,
    pub uuid: String,
    pub vid: String,
    pub hmac: String,
    pub action: String,
}

pub trait RiskPayload {
    fn kind(&self) -> PayloadKind;

    /// The cookie or token text exactly as received.
    fn raw(&self) -> &str;

    /// Decodes and validates once; later calls return the cached verdict.
    /// A failed attempt leaves the payload undecoded.
    fn deserialize(&mut self) -> bool;

    fn decoded(&self) -> Option<&DecodedPayload>;

    fn is_secure(&self) -> bool;

    fn score(&self) -> i64 {
        self.decoded().map_or(0, |d| d.score)
    }

    fn hmac(&self) -> &str {
        self.decoded().map_or("", |d| d.hmac.as_str())
    }

    fn block_action(&self) -> &str {
        self.decoded().map_or("c", |d| d.action.as_str())
    }

    fn uuid(&self) -> &str {
        self.decoded().map_or("", |d| d.uuid.as_str())
    }

    fn vid(&self) -> &str {
        self.decoded().map_or("", |d| d.vid.as_str())
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        self.decoded().map_or(true, |d| d.time_ms < now_ms)
    }

    fn is_high_score(&self, blocking_score: i64) -> bool {
        self.decoded().map_or(false, |d| d.score >= blocking_score)
    }

    /// Deserialize plus signature check, as one fallible step.
    fn verify(&mut self) -> Result<(), RiskError> {
        if !self.deserialize() {
            return Err(RiskError::DecryptionFailed);
        }
        if !self.is_secure() {
            return Err(RiskError::SignatureInvalid);
        }
        Ok(())
    }
}

pub fn build_payload<'a>(
    kind: PayloadKind,
    raw: &str,
    codec: PayloadCodec<'a>,
    signature: SignatureContext<'a>,
) -> Box<dyn RiskPayload + 'a> {
    match kind {
        PayloadKind::CookieV1 => Box::new(CookieV1::new(raw, codec, signature)),
        PayloadKind::CookieV3 => Box::new(CookieV3::new(raw, codec, signature)),
        PayloadKind::TokenV1 => Box::new(TokenV1::new(raw, codec)),
        PayloadKind::TokenV3 => Box::new(TokenV3::new(raw, codec)),
    }
}

/// `hash:payload`; the payload keeps any colons of its own.
pub(crate) fn split_v3(raw: &str) -> (String, String) {
    match raw.split_once(':') {
        Some((hash, rest)) => (hash.to_string(), rest.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

pub(crate) fn open_v1(codec: &PayloadCodec<'_>, encoded: &str) -> Result<DecodedPayload, RiskError> {
    let body = codec.open(encoded)?;
    let score_pair = body
        .get("s")
        .filter(|s| s.is_object())
        .ok_or(RiskError::FormatInvalid("missing score pair"))?;
    let score = number_field(score_pair, "b").ok_or(RiskError::FormatInvalid("missing score.b"))?;
    Ok(DecodedPayload {
        time_ms: number_field(&body, "t").ok_or(RiskError::FormatInvalid("missing t"))?,
        score,
        uuid: string_field(&body, "u").ok_or(RiskError::FormatInvalid("missing u"))?,
        vid: string_field(&body, "v").ok_or(RiskError::FormatInvalid("missing v"))?,
        hmac: string_field(&body, "h").ok_or(RiskError::FormatInvalid("missing h"))?,
        action: "c".to_string(),
        body,
    })
}

pub(crate) fn open_v3(
    codec: &PayloadCodec<'_>,
    encoded: &str,
    hmac: &str,
) -> Result<DecodedPayload, RiskError> {
    let body = codec.open(encoded)?;
    Ok(DecodedPayload {
        time_ms: number_field(&body, "t").ok_or(RiskError::FormatInvalid("missing t"))?,
        score: number_field(&body, "s").ok_or(RiskError::FormatInvalid("missing s"))?,
        uuid: string_field(&body, "u").ok_or(RiskError::FormatInvalid("missing u"))?,
        vid: string_field(&body, "v").ok_or(RiskError::FormatInvalid("missing v"))?,
        action: string_field(&body, "a").ok_or(RiskError::FormatInvalid("missing a"))?,
        hmac: hmac.to_string(),
        body,
    })
}

/// v1 canonical prefix: `t + s.a + s.b + u + v`, numbers rendered the way
/// the issuer's JavaScript renders them.
pub(crate) fn v1_signature_base(decoded: &DecodedPayload) -> String {
    let pair = decoded.body.get("s");
    let a = pair.and_then(|s| s.get("a")).map(js_number).unwrap_or_default();
    let b = pair.and_then(|s| s.get("b")).map(js_number).unwrap_or_default();
    let t = decoded.body.get("t").map(js_number).unwrap_or_default();
    format!("{}{}{}{}{}", t, a, b, decoded.uuid, decoded.vid)
}

fn number_field(body: &Value, key: &str) -> Option<i64> {
    let value = body.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn string_field(body: &Value, key: &str) -> Option<String> {
    body.get(key).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn js_number(value: &Value) -> String {
    if let Some(i) = value.as_i64() {
        return i.to_string();
    }
    if let Some(u) = value.as_u64() {
        return u.to_string();
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{}", f as i64),
        Some(f) => format!("{}", f),
        None => value.to_string(),
    }
}

pub(crate) fn deserialize_into(
    slot: &mut Option<DecodedPayload>,
    kind: PayloadKind,
    open: impl FnOnce() -> Result<DecodedPayload, RiskError>,
) -> bool {
    if slot.is_some() {
        return true;
    }
    match open() {
        Ok(decoded) => {
            *slot = Some(decoded);
            true
        }
        Err(err) => {
            tracing::debug!(kind = kind.as_str(), error = %err, "payload deserialization failed");
            false
        }
    }
}
