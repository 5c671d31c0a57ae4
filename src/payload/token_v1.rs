// src/payload/token_v1.rs
// Mobile SDK token, legacy layout. Not bound to user agent or IP.

use super::{
    deserialize_into, open_v1, v1_signature_base, DecodedPayload, PayloadCodec, PayloadKind,
    RiskPayload,
};

pub struct TokenV1<'a> {
    raw: String,
    codec: PayloadCodec<'a>,
    decoded: Option<DecodedPayload>,
}

impl<'a> TokenV1<'a> {
    pub fn new(raw: &str, codec: PayloadCodec<'a>) -> Self {
        Self {
            raw: raw.to_string(),
            codec,
            decoded: None,
        }
    }
}

impl RiskPayload for TokenV1<'_> {
    fn kind(&self) -> PayloadKind {
        PayloadKind::TokenV1
    }

    fn raw(&self) -> &str {
        &self.raw
    }

    fn deserialize(&mut self) -> bool {
        let codec = self.codec;
        let raw = self.raw.as_str();
        deserialize_into(&mut self.decoded, PayloadKind::TokenV1, || open_v1(&codec, raw))
    }

    fn decoded(&self) -> Option<&DecodedPayload> {
        self.decoded.as_ref()
    }

    fn is_secure(&self) -> bool {
        match self.decoded.as_ref() {
            Some(decoded) => self
                .codec
                .signature_matches(&v1_signature_base(decoded), &decoded.hmac),
            None => false,
        }
    }
}
