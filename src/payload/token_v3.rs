// src/payload/token_v3.rs
// Mobile SDK token: `<hmac>:<payload>`, signature over the payload alone.

use super::{
    deserialize_into, open_v3, split_v3, DecodedPayload, PayloadCodec, PayloadKind, RiskPayload,
};

pub struct TokenV3<'a> {
    raw: String,
    hmac: String,
    payload: String,
    codec: PayloadCodec<'a>,
    decoded: Option<DecodedPayload>,
}

impl<'a> TokenV3<'a> {
    pub fn new(raw: &str, codec: PayloadCodec<'a>) -> Self {
        let (hmac, payload) = split_v3(raw);
        Self {
            raw: raw.to_string(),
            hmac,
            payload,
            codec,
            decoded: None,
        }
    }
}

impl RiskPayload for TokenV3<'_> {
    fn kind(&self) -> PayloadKind {
        PayloadKind::TokenV3
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    fn deserialize(&mut self) -> bool {
        let codec = self.codec;
        let (payload, hmac) = (self.payload.as_str(), self.hmac.as_str());
        deserialize_into(&mut self.decoded, PayloadKind::TokenV3, || {
            open_v3(&codec, payload, hmac)
        })
    }

    fn decoded(&self) -> Option<&DecodedPayload> {
        self.decoded.as_ref()
    }

    fn is_secure(&self) -> bool {
        self.decoded.is_some() && self.codec.signature_matches(&self.payload, &self.hmac)
    }
}
