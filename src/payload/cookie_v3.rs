// src/payload/cookie_v3.rs
// `_px3` cookie: `<hmac>:<payload>`, signature bound to the user agent.

use super::{
    deserialize_into, open_v3, split_v3, DecodedPayload, PayloadCodec, PayloadKind, RiskPayload,
    SignatureContext,
};

pub struct CookieV3<'a> {
    raw: String,
    hmac: String,
    payload: String,
    codec: PayloadCodec<'a>,
    signature: SignatureContext<'a>,
    decoded: Option<DecodedPayload>,
}

impl<'a> CookieV3<'a> {
    pub fn new(raw: &str, codec: PayloadCodec<'a>, signature: SignatureContext<'a>) -> Self {
        let (hmac, payload) = split_v3(raw);
        Self {
            raw: raw.to_string(),
            hmac,
            payload,
            codec,
            signature,
            decoded: None,
        }
    }
}

impl RiskPayload for CookieV3<'_> {
    fn kind(&self) -> PayloadKind {
        PayloadKind::CookieV3
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    fn deserialize(&mut self) -> bool {
        let codec = self.codec;
        let (payload, hmac) = (self.payload.as_str(), self.hmac.as_str());
        deserialize_into(&mut self.decoded, PayloadKind::CookieV3, || {
            open_v3(&codec, payload, hmac)
        })
    }

    fn decoded(&self) -> Option<&DecodedPayload> {
        self.decoded.as_ref()
    }

    fn is_secure(&self) -> bool {
        if self.decoded.is_none() {
            return false;
        }
        let canonical = format!("{}{}", self.payload, self.signature.user_agent);
        self.codec.signature_matches(&canonical, &self.hmac)
    }
}
