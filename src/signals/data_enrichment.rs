// src/signals/data_enrichment.rs
// `_pxde` side-channel payload: `<hmac>:<base64 json>`.

use serde_json::{Map, Value};

use crate::config::HashDigest;

#[derive(Debug, Clone, PartialEq)]
pub struct DataEnrichment {
    pub payload: Map<String, Value>,
    pub verified: bool,
}

impl DataEnrichment {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Only a verified payload can vouch for a breached-credentials flag.
    pub fn breached_account(&self) -> bool {
        self.verified
            && self
                .payload
                .get("breached_account")
                .is_some_and(|flag| flag.as_bool() == Some(true) || flag.as_i64() == Some(1))
    }
}

/// A signature mismatch still yields the decoded payload, flagged unverified.
/// Anything that does not decode to a JSON object is treated as absent.
pub fn decode_cookie(raw: &str, secret: &str, digest: HashDigest) -> Option<DataEnrichment> {
    let Some((hmac, payload_b64)) = raw.split_once(':') else {
        tracing::debug!("data enrichment cookie missing signature separator");
        return None;
    };
    let verified = crate::crypto::hmac_matches(digest, secret, payload_b64, hmac);
    if !verified {
        tracing::debug!("data enrichment signature mismatch");
    }
    decode_payload(payload_b64).map(|payload| DataEnrichment { payload, verified })
}

/// The risk API already authenticated its own response body.
pub fn from_remote(value: &Value) -> Option<DataEnrichment> {
    value.as_object().map(|payload| DataEnrichment {
        payload: payload.clone(),
        verified: true,
    })
}

fn decode_payload(payload_b64: &str) -> Option<Map<String, Value>> {
    match crate::crypto::decode_base64_json(payload_b64) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::debug!("data enrichment payload is not an object");
            None
        }
        Err(err) => {
            tracing::debug!(error = %err, "data enrichment payload unreadable");
            None
        }
    }
}
