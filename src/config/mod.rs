// src/config/mod.rs
// Enforcer configuration: a JSON snapshot with defaults, overlaid by env secrets.
// The loaded value is immutable and shared behind an Arc by every component.

use std::env;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

mod routes;

pub use routes::{IpFilter, RoutePattern, RouteSet};

pub const BLOCKING_SCORE_MIN: u8 = 0;
pub const BLOCKING_SCORE_MAX: u8 = 100;
pub const API_TIMEOUT_MS_MIN: u64 = 100;
pub const API_TIMEOUT_MS_MAX: u64 = 10_000;
const DEFAULT_BLOCKING_SCORE: u8 = 100;
const DEFAULT_API_TIMEOUT_MS: u64 = 1_000;
const SUPPORTED_CIPHER: &str = "aes-256-cbc";
const AES_256_KEY_LEN: usize = 32;
const AES_BLOCK_LEN: usize = 16;
const RISK_API_PATH: &str = "/api/v3/risk";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigLoadError {
    #[error("invalid enforcer config: {0}")]
    InvalidJson(String),
    #[error("unsupported cookie cipher {0}")]
    UnsupportedCipher(String),
    #[error("key derivation lengths key_len={key_len} iv_len={iv_len} do not fit aes-256-cbc")]
    InvalidKeyDerivation { key_len: usize, iv_len: usize },
    #[error("invalid env var {name}={value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModuleMode {
    Monitor,
    ActiveBlocking,
}

impl ModuleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleMode::Monitor => "monitor",
            ModuleMode::ActiveBlocking => "active_blocking",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashDigest {
    Sha256,
    Sha512,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiProtocolVersion {
    #[serde(rename = "v1")]
    V1,
    #[serde(rename = "v2")]
    V2,
    #[serde(rename = "multistep_sso")]
    MultistepSso,
}

impl CiProtocolVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            CiProtocolVersion::V1 => "v1",
            CiProtocolVersion::V2 => "v2",
            CiProtocolVersion::MultistepSso => "multistep_sso",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentThrough {
    #[serde(rename = "body")]
    Body,
    #[serde(rename = "header")]
    Header,
    #[serde(rename = "query-param")]
    QueryParam,
}

/// Where to find login credentials for one `(path, method)` pair.
#[derive(Deserialize, Debug, Clone)]
pub struct CredentialsExtractionRule {
    pub path: String,
    pub method: String,
    pub sent_through: SentThrough,
    pub user_field: String,
    pub pass_field: String,
}

/// PBKDF2 and cipher parameters for encrypted cookies.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct KeyDerivation {
    pub key_len: usize,
    pub iv_len: usize,
    pub digest: HashDigest,
    pub cipher: String,
}

impl Default for KeyDerivation {
    fn default() -> Self {
        Self {
            key_len: AES_256_KEY_LEN,
            iv_len: AES_BLOCK_LEN,
            digest: HashDigest::Sha256,
            cipher: SUPPORTED_CIPHER.to_string(),
        }
    }
}

/// Field paths are dotted, e.g. `sub.id`.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct JwtConfig {
    pub cookie_name: Option<String>,
    pub cookie_user_id_field: Option<String>,
    pub cookie_additional_fields: Vec<String>,
    pub header_name: Option<String>,
    pub header_user_id_field: Option<String>,
    pub header_additional_fields: Vec<String>,
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct EnforcerConfig {
    pub app_id: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub cookie_secret: Option<SecretString>,
    #[serde(deserialize_with = "deserialize_secret")]
    pub auth_token: Option<SecretString>,
    pub blocking_score: u8,
    pub module_mode: ModuleMode,
    pub module_version: String,
    pub backend_url: Option<String>,
    pub api_timeout_ms: u64,
    pub encryption_enabled: bool,
    pub key_derivation: KeyDerivation,
    pub hmac_digest: HashDigest,
    pub first_party_enabled: bool,
    pub sensitive_headers: Vec<String>,
    pub ip_headers: Vec<String>,
    pub sensitive_routes: RouteSet,
    pub whitelist_routes: RouteSet,
    pub enforced_routes: RouteSet,
    pub monitored_routes: RouteSet,
    pub filter_by_user_agent: Vec<String>,
    pub filter_by_ip: Vec<IpFilter>,
    pub bypass_monitor_header: Option<String>,
    pub ci_enabled: bool,
    pub ci_version: CiProtocolVersion,
    pub credentials_extraction: Vec<CredentialsExtractionRule>,
    pub graphql_enabled: bool,
    pub graphql_routes: RouteSet,
    pub sensitive_graphql_operation_names: Vec<String>,
    pub sensitive_graphql_operation_types: Vec<String>,
    pub jwt: JwtConfig,
    pub remote_config_id: Option<String>,
    pub remote_config_version: Option<i64>,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            cookie_secret: None,
            auth_token: None,
            blocking_score: DEFAULT_BLOCKING_SCORE,
            module_mode: ModuleMode::Monitor,
            module_version: format!("px-enforcer-core v{}", env!("CARGO_PKG_VERSION")),
            backend_url: None,
            api_timeout_ms: DEFAULT_API_TIMEOUT_MS,
            encryption_enabled: true,
            key_derivation: KeyDerivation::default(),
            hmac_digest: HashDigest::Sha256,
            first_party_enabled: true,
            sensitive_headers: vec!["cookie".to_string(), "cookies".to_string()],
            ip_headers: Vec::new(),
            sensitive_routes: RouteSet::default(),
            whitelist_routes: RouteSet::default(),
            enforced_routes: RouteSet::default(),
            monitored_routes: RouteSet::default(),
            filter_by_user_agent: Vec::new(),
            filter_by_ip: Vec::new(),
            bypass_monitor_header: None,
            ci_enabled: false,
            ci_version: CiProtocolVersion::V2,
            credentials_extraction: Vec::new(),
            graphql_enabled: true,
            graphql_routes: RouteSet::new(vec![RoutePattern::prefix("/graphql")]),
            sensitive_graphql_operation_names: Vec::new(),
            sensitive_graphql_operation_types: Vec::new(),
            jwt: JwtConfig::default(),
            remote_config_id: None,
            remote_config_version: None,
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|secret| !secret.trim().is_empty())
        .map(SecretString::from))
}

impl EnforcerConfig {
    /// Parses a JSON snapshot, clamps tunables and validates the cipher setup.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigLoadError> {
        let mut cfg = serde_json::from_slice::<EnforcerConfig>(bytes)
            .map_err(|err| ConfigLoadError::InvalidJson(err.to_string()))?;
        clamp_config_values(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads from JSON, then applies `PX_*` process env overrides.
    pub fn load(bytes: &[u8]) -> Result<Self, ConfigLoadError> {
        let mut cfg = Self::from_json(bytes)?;
        cfg.apply_env_overrides_with(|name| env::var(name).ok())?;
        Ok(cfg)
    }

    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(app_id) = lookup("PX_APP_ID").filter(|v| !v.trim().is_empty()) {
            self.app_id = app_id.trim().to_string();
        }
        if let Some(secret) = lookup("PX_COOKIE_SECRET").filter(|v| !v.trim().is_empty()) {
            self.cookie_secret = Some(SecretString::from(secret));
        }
        if let Some(token) = lookup("PX_AUTH_TOKEN").filter(|v| !v.trim().is_empty()) {
            self.auth_token = Some(SecretString::from(token));
        }
        if let Some(mode) = lookup("PX_MODULE_MODE") {
            self.module_mode =
                parse_module_mode(&mode).ok_or(ConfigLoadError::InvalidEnv {
                    name: "PX_MODULE_MODE",
                    value: mode,
                })?;
        }
        self.blocking_score =
            parse_blocking_score(lookup("PX_BLOCKING_SCORE").as_deref(), self.blocking_score);
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        let kd = &self.key_derivation;
        if !kd.cipher.eq_ignore_ascii_case(SUPPORTED_CIPHER) {
            return Err(ConfigLoadError::UnsupportedCipher(kd.cipher.clone()));
        }
        if kd.key_len != AES_256_KEY_LEN || kd.iv_len != AES_BLOCK_LEN {
            return Err(ConfigLoadError::InvalidKeyDerivation {
                key_len: kd.key_len,
                iv_len: kd.iv_len,
            });
        }
        Ok(())
    }

    pub fn cookie_secret(&self) -> Option<&str> {
        self.cookie_secret.as_ref().map(|secret| secret.expose_secret())
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_ref().map(|token| token.expose_secret())
    }

    pub fn risk_api_url(&self) -> String {
        let base = match &self.backend_url {
            Some(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            _ => format!("https://sapi-{}.perimeterx.net", self.app_id.to_lowercase()),
        };
        format!("{}{}", base, RISK_API_PATH)
    }

    pub fn is_sensitive_route(&self, uri: &str) -> bool {
        self.sensitive_routes.matches(uri)
    }

    pub fn is_whitelisted_route(&self, uri: &str) -> bool {
        self.whitelist_routes.matches(uri)
    }

    pub fn is_enforced_route(&self, uri: &str) -> bool {
        self.enforced_routes.matches(uri)
    }

    pub fn is_monitored_route(&self, uri: &str) -> bool {
        self.monitored_routes.matches(uri)
    }

    pub fn is_graphql_route(&self, uri: &str) -> bool {
        self.graphql_enabled && self.graphql_routes.matches(uri)
    }

    pub fn is_filtered_user_agent(&self, user_agent: &str) -> bool {
        if user_agent.is_empty() {
            return false;
        }
        let lowered = user_agent.to_ascii_lowercase();
        self.filter_by_user_agent
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .any(|entry| lowered.contains(entry.trim().to_ascii_lowercase().as_str()))
    }

    pub fn is_filtered_ip(&self, ip: &str) -> bool {
        self.filter_by_ip.iter().any(|filter| filter.contains(ip))
    }

    pub fn is_sensitive_header(&self, name: &str) -> bool {
        self.sensitive_headers
            .iter()
            .any(|header| header.eq_ignore_ascii_case(name))
    }
}

pub(crate) fn parse_module_mode(value: &str) -> Option<ModuleMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monitor" => Some(ModuleMode::Monitor),
        "active_blocking" | "active-blocking" | "blocking" => Some(ModuleMode::ActiveBlocking),
        _ => None,
    }
}

pub(crate) fn parse_blocking_score(value: Option<&str>, current: u8) -> u8 {
    value
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .map(|score| score.min(BLOCKING_SCORE_MAX as u32) as u8)
        .unwrap_or(current)
}

fn clamp_config_values(cfg: &mut EnforcerConfig) {
    cfg.blocking_score = cfg.blocking_score.clamp(BLOCKING_SCORE_MIN, BLOCKING_SCORE_MAX);
    cfg.api_timeout_ms = cfg.api_timeout_ms.clamp(API_TIMEOUT_MS_MIN, API_TIMEOUT_MS_MAX);
    for header in cfg.sensitive_headers.iter_mut() {
        *header = header.trim().to_ascii_lowercase();
    }
    for header in cfg.ip_headers.iter_mut() {
        *header = header.trim().to_ascii_lowercase();
    }
}

#[cfg(test)]
mod tests;
