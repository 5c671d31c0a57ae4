// src/payload/cookie_v1.rs
// Legacy `_px` cookie: the signature lives inside the encrypted body.

use super::{
    deserialize_into, open_v1, v1_signature_base, DecodedPayload, PayloadCodec, PayloadKind,
    RiskPayload, SignatureContext,
};

pub struct CookieV1<'a> {
    raw: String,
    codec: PayloadCodec<'a>,
    signature: SignatureContext<'a>,
    decoded: Option<DecodedPayload>,
}

impl<'a> CookieV1<'a> {
    pub fn new(raw: &str, codec: PayloadCodec<'a>, signature: SignatureContext<'a>) -> Self {
        Self {
            raw: raw.to_string(),
            codec,
            signature,
            decoded: None,
        }
    }
}

impl RiskPayload for CookieV1<'_> {
    fn kind(&self) -> PayloadKind {
        PayloadKind::CookieV1
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    fn deserialize(&mut self) -> bool {
        let codec = self.codec;
        let raw = self.raw.as_str();
        deserialize_into(&mut self.decoded, PayloadKind::CookieV1, || open_v1(&codec, raw))
    }

    fn decoded(&self) -> Option<&DecodedPayload> {
        self.decoded.as_ref()
    }

    /// Older issuers bound the cookie to the client IP as well; both
    /// canonical forms are accepted.
    fn is_secure(&self) -> bool {
        let Some(decoded) = self.decoded.as_ref() else {
            return false;
        };
        let base = v1_signature_base(decoded);
        let without_ip = format!("{}{}", base, self.signature.user_agent);
        let with_ip = format!("{}{}{}", base, self.signature.ip, self.signature.user_agent);
        self.codec.signature_matches(&without_ip, &decoded.hmac)
            || self.codec.signature_matches(&with_ip, &decoded.hmac)
    }
}
