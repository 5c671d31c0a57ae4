use std::future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use secrecy::SecretString;
use serde_json::{json, Value};
use spin_sdk::http::{Method, Request};

use crate::config::{EnforcerConfig, HashDigest, KeyDerivation};
use crate::crypto::{derive_key, hmac_hex};
use crate::payload::js_number;
use crate::providers::contracts::{HttpClient, HttpResponse, TransportError};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

pub(crate) const TEST_SECRET: &str = "px-test-cookie-secret";
pub(crate) const TEST_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) px-test";
pub(crate) const TEST_IP: &str = "203.0.113.10";
pub(crate) const TEST_UUID: &str = "09ade30a-f08b-11e7-8c3f-9a214cf093ae";
pub(crate) const TEST_VID: &str = "0290edec-f08b-11e7-8c3f-9a214cf093ae";
pub(crate) const FIXTURE_ITERATIONS: u32 = 1000;

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub(crate) fn future_ms() -> i64 {
    now_ms() + 10 * 60 * 1000
}

pub(crate) fn past_ms() -> i64 {
    now_ms() - 60 * 1000
}

pub(crate) fn test_config(json: &str) -> Arc<EnforcerConfig> {
    let mut cfg = EnforcerConfig::from_json(json.as_bytes()).expect("test config parses");
    if cfg.cookie_secret().is_none() && !json.contains("cookie_secret") {
        cfg.cookie_secret = Some(SecretString::from(TEST_SECRET.to_string()));
    }
    Arc::new(cfg)
}

pub(crate) fn encrypt_payload(secret: &str, payload: &Value, iterations: u32) -> String {
    let salt: [u8; 16] = rand::random();
    encrypt_payload_with_salt(secret, payload, iterations, &salt)
}

pub(crate) fn encrypt_payload_with_salt(
    secret: &str,
    payload: &Value,
    iterations: u32,
    salt: &[u8],
) -> String {
    let (key, iv) = derive_key(secret.as_bytes(), salt, iterations, &KeyDerivation::default());
    let ciphertext = Aes256CbcEnc::new_from_slices(&key, &iv)
        .expect("aes-256 key and iv lengths")
        .encrypt_padded_vec_mut::<Pkcs7>(payload.to_string().as_bytes());
    format!(
        "{}:{}:{}",
        general_purpose::STANDARD.encode(salt),
        iterations,
        general_purpose::STANDARD.encode(ciphertext)
    )
}

pub(crate) fn encode_plain(payload: &Value) -> String {
    general_purpose::STANDARD.encode(payload.to_string())
}

pub(crate) fn v3_body(expires_ms: i64, score: i64, action: &str) -> Value {
    json!({"t": expires_ms, "s": score, "u": TEST_UUID, "v": TEST_VID, "a": action})
}

pub(crate) fn v1_body(expires_ms: i64, score: i64) -> Value {
    json!({"t": expires_ms, "s": {"a": 0, "b": score}, "u": TEST_UUID, "v": TEST_VID})
}

fn v1_base(body: &Value) -> String {
    let field = |value: Option<&Value>| value.map(js_number).unwrap_or_default();
    format!(
        "{}{}{}{}{}",
        field(body.get("t")),
        field(body.pointer("/s/a")),
        field(body.pointer("/s/b")),
        body.get("u").and_then(Value::as_str).unwrap_or(""),
        body.get("v").and_then(Value::as_str).unwrap_or("")
    )
}

/// `<hmac>:<encrypted>`, signed over the encrypted text plus the user agent.
pub(crate) fn issue_cookie_v3(secret: &str, body: &Value, user_agent: &str) -> String {
    let encrypted = encrypt_payload(secret, body, FIXTURE_ITERATIONS);
    let hmac = hmac_hex(
        HashDigest::Sha256,
        secret,
        &format!("{}{}", encrypted, user_agent),
    );
    format!("{}:{}", hmac, encrypted)
}

pub(crate) fn issue_token_v3(secret: &str, body: &Value) -> String {
    let encrypted = encrypt_payload(secret, body, FIXTURE_ITERATIONS);
    format!("{}:{}", hmac_hex(HashDigest::Sha256, secret, &encrypted), encrypted)
}

/// Embeds `h` before encrypting. `ip` selects the IP-bound canonical form.
pub(crate) fn issue_cookie_v1(
    secret: &str,
    body: &Value,
    user_agent: &str,
    ip: Option<&str>,
) -> String {
    let canonical = format!("{}{}{}", v1_base(body), ip.unwrap_or(""), user_agent);
    let mut signed = body.clone();
    signed["h"] = Value::String(hmac_hex(HashDigest::Sha256, secret, &canonical));
    encrypt_payload(secret, &signed, FIXTURE_ITERATIONS)
}

pub(crate) fn issue_token_v1(secret: &str, body: &Value) -> String {
    let mut signed = body.clone();
    signed["h"] = Value::String(hmac_hex(HashDigest::Sha256, secret, &v1_base(body)));
    encrypt_payload(secret, &signed, FIXTURE_ITERATIONS)
}

/// Replaces the first character of `value` with a different hex digit.
pub(crate) fn corrupt_first_char(value: &str) -> String {
    let mut chars = value.chars();
    let first = chars.next().unwrap_or('0');
    let replacement = if first == '0' { '1' } else { '0' };
    format!("{}{}", replacement, chars.as_str())
}

pub(crate) fn request_with_headers(path: &str, headers: &[(&str, &str)]) -> Request {
    request_with_method_and_headers(Method::Get, path, headers, Vec::new())
}

pub(crate) fn request_with_method_and_headers(
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> Request {
    let mut builder = Request::builder();
    builder.method(method).uri(path);
    for (key, value) in headers {
        builder.header(*key, *value);
    }
    builder.body(body);
    builder.build()
}

pub(crate) enum MockReply {
    Respond(u16, String),
    Fail(TransportError),
    Hang,
}

/// Scripted HttpClient that records what it was asked to send.
pub(crate) struct MockHttpClient {
    reply: MockReply,
    pub post_calls: AtomicUsize,
    pub last_url: Mutex<Option<String>>,
    pub last_headers: Mutex<Vec<(String, String)>>,
    pub last_body: Mutex<Option<String>>,
}

impl MockHttpClient {
    pub fn new(reply: MockReply) -> Self {
        Self {
            reply,
            post_calls: AtomicUsize::new(0),
            last_url: Mutex::new(None),
            last_headers: Mutex::new(Vec::new()),
            last_body: Mutex::new(None),
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::new(MockReply::Respond(status, body.to_string()))
    }

    pub fn calls(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn sent_json(&self) -> Value {
        let body = self
            .last_body
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .expect("a request was sent");
        serde_json::from_str(&body).expect("request body is json")
    }

    pub fn sent_header(&self, name: &str) -> Option<String> {
        self.last_headers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    async fn reply(&self) -> Result<HttpResponse, TransportError> {
        match &self.reply {
            MockReply::Respond(status, body) => Ok(HttpResponse::new(*status, body.clone())),
            MockReply::Fail(err) => Err(err.clone()),
            MockReply::Hang => future::pending().await,
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        *self.last_url.lock().unwrap_or_else(|p| p.into_inner()) = Some(url.to_string());
        *self.last_headers.lock().unwrap_or_else(|p| p.into_inner()) = headers.to_vec();
        self.reply().await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &str,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock().unwrap_or_else(|p| p.into_inner()) = Some(url.to_string());
        *self.last_headers.lock().unwrap_or_else(|p| p.into_inner()) = headers.to_vec();
        *self.last_body.lock().unwrap_or_else(|p| p.into_inner()) = Some(body.to_string());
        self.reply().await
    }
}
