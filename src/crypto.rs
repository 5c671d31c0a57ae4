// src/crypto.rs
// Cookie codec: PBKDF2 key derivation, AES-256-CBC decryption and HMAC helpers

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::config::{HashDigest, KeyDerivation};
use crate::error::RiskError;

pub const PBKDF2_ITERATIONS_MIN: u32 = 500;
pub const PBKDF2_ITERATIONS_MAX: u32 = 5000;
pub const MAX_SALT_LEN: usize = 100;

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Standard alphabet, padding optional. Issuers are not consistent about
/// trailing `=`.
pub(crate) const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The three parts of `<saltB64>:<iterations>:<ciphertextB64>`, already
/// checked against the protocol bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCookie<'a> {
    pub salt_b64: &'a str,
    pub iterations: u32,
    pub ciphertext_b64: &'a str,
}

impl<'a> EncryptedCookie<'a> {
    /// Structural checks only. Runs before any key derivation so an
    /// attacker-chosen iteration count never reaches PBKDF2.
    pub fn parse(raw: &'a str) -> Result<Self, RiskError> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 3 {
            return Err(RiskError::FormatInvalid("expected salt:iterations:ciphertext"));
        }
        let iterations = parts[1]
            .trim()
            .parse::<u32>()
            .map_err(|_| RiskError::FormatInvalid("iterations not numeric"))?;
        if !(PBKDF2_ITERATIONS_MIN..=PBKDF2_ITERATIONS_MAX).contains(&iterations) {
            return Err(RiskError::FormatInvalid("iterations out of range"));
        }
        if parts[0].chars().count() > MAX_SALT_LEN {
            return Err(RiskError::FormatInvalid("salt too long"));
        }
        Ok(Self {
            salt_b64: parts[0],
            iterations,
            ciphertext_b64: parts[2],
        })
    }
}

/// Derives `key_len + iv_len` bytes and splits them into (key, iv).
pub fn derive_key(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
    params: &KeyDerivation,
) -> (Vec<u8>, Vec<u8>) {
    let mut derived = vec![0u8; params.key_len + params.iv_len];
    match params.digest {
        HashDigest::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut derived),
        HashDigest::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(secret, salt, iterations, &mut derived),
    }
    let iv = derived.split_off(params.key_len);
    (derived, iv)
}

/// AES-256-CBC with PKCS#7 padding, then JSON. Every failure collapses to
/// `DecryptionFailed`.
pub fn decrypt(ciphertext_b64: &str, key: &[u8], iv: &[u8]) -> Result<Value, RiskError> {
    let ciphertext = LENIENT_BASE64
        .decode(ciphertext_b64.trim())
        .map_err(|_| RiskError::DecryptionFailed)?;
    let cipher =
        Aes256CbcDec::new_from_slices(key, iv).map_err(|_| RiskError::DecryptionFailed)?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| RiskError::DecryptionFailed)?;
    serde_json::from_slice::<Value>(&plaintext).map_err(|_| RiskError::DecryptionFailed)
}

pub fn decrypt_cookie(raw: &str, secret: &str, params: &KeyDerivation) -> Result<Value, RiskError> {
    let parsed = EncryptedCookie::parse(raw)?;
    let salt = LENIENT_BASE64
        .decode(parsed.salt_b64.trim())
        .map_err(|_| RiskError::FormatInvalid("salt is not base64"))?;
    let (key, iv) = derive_key(secret.as_bytes(), &salt, parsed.iterations, params);
    decrypt(parsed.ciphertext_b64, &key, &iv)
}

pub fn decode_base64_json(value: &str) -> Result<Value, RiskError> {
    let bytes = LENIENT_BASE64
        .decode(value.trim())
        .map_err(|_| RiskError::FormatInvalid("payload is not base64"))?;
    serde_json::from_slice::<Value>(&bytes).map_err(|_| RiskError::FormatInvalid("payload is not json"))
}

pub fn hmac_hex(digest: HashDigest, secret: &str, message: &str) -> String {
    match digest {
        HashDigest::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts any secret length");
            mac.update(message.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        HashDigest::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes())
                .expect("HMAC accepts any secret length");
            mac.update(message.as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
    }
}

pub fn hmac_matches(digest: HashDigest, secret: &str, message: &str, expected_hex: &str) -> bool {
    if expected_hex.is_empty() {
        return false;
    }
    constant_time_eq(&hmac_hex(digest, secret, message), expected_hex)
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

pub fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
