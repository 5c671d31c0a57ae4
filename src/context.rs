// src/context.rs
// Per-request risk context: inbound facts, parsed PX cookies and the evidence
// each evaluation stage accumulates before the decision is rendered.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{CiProtocolVersion, EnforcerConfig};
use crate::payload::{COOKIE_V1_NAME, COOKIE_V3_NAME};
use crate::signals::data_enrichment::{self, DataEnrichment};
use crate::signals::graphql::{self, GraphqlOperation};
use crate::signals::jwt;

pub const MOBILE_AUTH_HEADER: &str = "x-px-authorization";
pub const MOBILE_ORIGINAL_TOKEN_HEADER: &str = "x-px-original-token";
const PXHD_COOKIE: &str = "_pxhd";
const PXDE_COOKIE: &str = "_pxde";
const PXVID_COOKIE: &str = "_pxvid";

/// Transport-neutral view of one inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestFacts {
    pub remote_addr: String,
    pub method: String,
    /// Path plus query string, as received.
    pub uri: String,
    pub scheme: String,
    pub http_version: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RequestFacts {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            uri: uri.to_string(),
            scheme: "https".to_string(),
            http_version: "1.1".to_string(),
            ..Self::default()
        }
    }

    pub fn with_remote_addr(mut self, addr: &str) -> Self {
        self.remote_addr = addr.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or("")
    }

    pub fn query(&self) -> &str {
        self.uri.split_once('?').map(|(_, query)| query).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieOrigin {
    Cookie,
    Header,
}

impl CookieOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            CookieOrigin::Cookie => "cookie",
            CookieOrigin::Header => "header",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAction {
    Captcha,
    Block,
    Challenge,
    RateLimit,
}

impl BlockAction {
    /// Unknown codes fall back to captcha.
    pub fn from_code(code: &str) -> Self {
        match code {
            "b" => BlockAction::Block,
            "j" => BlockAction::Challenge,
            "r" => BlockAction::RateLimit,
            _ => BlockAction::Captcha,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            BlockAction::Captcha => "c",
            BlockAction::Block => "b",
            BlockAction::Challenge => "j",
            BlockAction::RateLimit => "r",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockAction::Captcha => "captcha",
            BlockAction::Block => "block",
            BlockAction::Challenge => "challenge",
            BlockAction::RateLimit => "ratelimit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    Cookie,
    S2s,
    S2sTimeout,
    S2sError,
    WhitelistRoute,
    FilteredUserAgent,
    FilteredIp,
    InvalidRequest,
}

impl PassReason {
    pub fn as_str(self) -> &'static str {
        match self {
            PassReason::Cookie => "cookie",
            PassReason::S2s => "s2s",
            PassReason::S2sTimeout => "s2s_timeout",
            PassReason::S2sError => "s2s_error",
            PassReason::WhitelistRoute => "whitelist_route",
            PassReason::FilteredUserAgent => "filtered_user_agent",
            PassReason::FilteredIp => "filtered_ip",
            PassReason::InvalidRequest => "invalid_request",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    CookieHighScore,
    S2sHighScore,
    Challenge,
    ExceededRateLimit,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockReason::CookieHighScore => "cookie_high_score",
            BlockReason::S2sHighScore => "s2s_high_score",
            BlockReason::Challenge => "challenge",
            BlockReason::ExceededRateLimit => "exceeded_rate_limit",
        }
    }
}

/// Why the remote risk call is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallReason {
    NoCookie,
    NoCookieKey,
    CookieDecryptionFailed,
    CookieExpired,
    CookieValidationFailed,
    SensitiveRoute,
    MobileNoToken,
    MobileConnectionError,
    MobilePinningError,
}

impl CallReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CallReason::NoCookie => "no_cookie",
            CallReason::NoCookieKey => "no_cookie_key",
            CallReason::CookieDecryptionFailed => "cookie_decryption_failed",
            CallReason::CookieExpired => "cookie_expired",
            CallReason::CookieValidationFailed => "cookie_validation_failed",
            CallReason::SensitiveRoute => "sensitive_route",
            CallReason::MobileNoToken => "mobile_error_1",
            CallReason::MobileConnectionError => "mobile_error_2",
            CallReason::MobilePinningError => "mobile_error_3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S2SErrorReason {
    UnableToSendRequest,
    BadRequest,
    ServerError,
    InvalidResponse,
    RequestFailedOnServer,
    UnknownError,
}

impl S2SErrorReason {
    pub fn as_str(self) -> &'static str {
        match self {
            S2SErrorReason::UnableToSendRequest => "unable_to_send_request",
            S2SErrorReason::BadRequest => "bad_request",
            S2SErrorReason::ServerError => "server_error",
            S2SErrorReason::InvalidResponse => "invalid_response",
            S2SErrorReason::RequestFailedOnServer => "request_failed_on_server",
            S2SErrorReason::UnknownError => "unknown_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S2SErrorInfo {
    pub reason: S2SErrorReason,
    pub message: String,
    pub http_status: Option<u16>,
    pub http_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginalTokenError {
    DecryptionFailed,
    ValidationFailed,
}

impl OriginalTokenError {
    pub fn as_str(self) -> &'static str {
        match self {
            OriginalTokenError::DecryptionFailed => "decryption_failed",
            OriginalTokenError::ValidationFailed => "validation_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SsoStep {
    User,
    Pass,
}

/// Hashed login attempt. `username` is a hash for v1/v2 and the raw value
/// for multistep SSO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCredentialsFields {
    pub username: Option<String>,
    pub password: Option<String>,
    pub raw_username: Option<String>,
    pub version: CiProtocolVersion,
    pub sso_step: Option<SsoStep>,
}

#[derive(Debug, Clone)]
pub struct RiskContext {
    pub request_id: String,
    pub ip: String,
    pub method: String,
    pub uri: String,
    pub full_url: String,
    pub http_version: String,
    /// Lower-cased names, original order.
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
    pub hostname: String,
    pub px_cookies: Vec<(String, String)>,
    pub request_cookie_names: Vec<String>,
    pub cookie_origin: CookieOrigin,
    pub original_token: Option<String>,
    pub pxhd: Option<String>,
    pub vid: Option<String>,
    pub vid_source: Option<&'static str>,
    pub uuid: Option<String>,
    pub score: Option<i64>,
    pub decoded_cookie: Option<Value>,
    pub cookie_hmac: Option<String>,
    pub block_action: Option<BlockAction>,
    pub block_action_data: Option<String>,
    pub pass_reason: Option<PassReason>,
    pub block_reason: Option<BlockReason>,
    pub call_reason: Option<CallReason>,
    pub s2s_error: Option<S2SErrorInfo>,
    pub sensitive_route: bool,
    pub whitelist_route: bool,
    pub enforced_route: bool,
    pub monitored_route: bool,
    pub bypass_monitor: bool,
    pub px_orig_cookie: Option<String>,
    pub original_uuid: Option<String>,
    pub decoded_original_token: Option<Value>,
    pub original_token_error: Option<OriginalTokenError>,
    pub graphql_operations: Vec<GraphqlOperation>,
    pub app_user_id: Option<String>,
    pub jwt_additional_fields: Option<Map<String, Value>>,
    pub credentials: Option<LoginCredentialsFields>,
    pub data_enrichment: Option<DataEnrichment>,
    pub remote_config_stale: bool,
}

impl RiskContext {
    pub fn new(facts: &RequestFacts, cfg: &EnforcerConfig) -> Self {
        let headers: Vec<(String, String)> = facts
            .headers
            .iter()
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.clone()))
            .collect();
        let header = |name: &str| find_header(&headers, name);

        let hostname = header("host").unwrap_or("").to_string();
        let user_agent = header("user-agent").unwrap_or("").to_string();
        let ip = resolve_client_ip(&headers, &cfg.ip_headers, &facts.remote_addr);
        let uri = facts.uri.clone();
        let full_url = if hostname.is_empty() {
            uri.clone()
        } else {
            format!("{}://{}{}", facts.scheme, hostname, uri)
        };

        let cookies = parse_cookie_header(header("cookie").unwrap_or(""));
        let mut ctx = Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            ip,
            method: facts.method.to_ascii_uppercase(),
            full_url,
            http_version: facts.http_version.clone(),
            user_agent,
            hostname,
            px_cookies: Vec::new(),
            request_cookie_names: cookies.iter().map(|(name, _)| name.clone()).collect(),
            cookie_origin: CookieOrigin::Cookie,
            original_token: None,
            pxhd: None,
            vid: None,
            vid_source: None,
            uuid: None,
            score: None,
            decoded_cookie: None,
            cookie_hmac: None,
            block_action: None,
            block_action_data: None,
            pass_reason: None,
            block_reason: None,
            call_reason: None,
            s2s_error: None,
            sensitive_route: cfg.is_sensitive_route(&uri),
            whitelist_route: cfg.is_whitelisted_route(&uri),
            enforced_route: cfg.is_enforced_route(&uri),
            monitored_route: cfg.is_monitored_route(&uri),
            bypass_monitor: false,
            px_orig_cookie: None,
            original_uuid: None,
            decoded_original_token: None,
            original_token_error: None,
            graphql_operations: Vec::new(),
            app_user_id: None,
            jwt_additional_fields: None,
            credentials: None,
            data_enrichment: None,
            remote_config_stale: false,
            uri,
            headers: Vec::new(),
        };

        let mut pxde_raw = None;
        for (name, value) in &cookies {
            match name.as_str() {
                COOKIE_V1_NAME | COOKIE_V3_NAME => {
                    ctx.px_cookies.push((name.clone(), value.clone()))
                }
                PXHD_COOKIE => ctx.pxhd = Some(value.clone()),
                PXDE_COOKIE => pxde_raw = Some(value.clone()),
                PXVID_COOKIE if !value.is_empty() => {
                    ctx.vid = Some(value.clone());
                    ctx.vid_source = Some("vid_cookie");
                }
                _ => {}
            }
        }

        if let Some(auth) = header(MOBILE_AUTH_HEADER) {
            ctx.cookie_origin = CookieOrigin::Header;
            ctx.px_cookies.clear();
            let (name, token) = split_mobile_token(auth);
            ctx.px_cookies.push((name.to_string(), token.to_string()));
            ctx.original_token = header(MOBILE_ORIGINAL_TOKEN_HEADER).map(str::to_string);
        }

        if let Some(name) = cfg.bypass_monitor_header.as_deref() {
            ctx.bypass_monitor = header(&name.to_ascii_lowercase()).map(str::trim) == Some("1");
        }

        if cfg.is_graphql_route(&ctx.uri) {
            ctx.graphql_operations = graphql::parse_operations(&facts.body);
            if graphql::any_sensitive(&ctx.graphql_operations, cfg) {
                ctx.sensitive_route = true;
            }
        }

        let jwt_header = cfg
            .jwt
            .header_name
            .as_deref()
            .and_then(|name| header(&name.to_ascii_lowercase()));
        let jwt_cookie = cfg.jwt.cookie_name.as_deref().and_then(|name| {
            cookies
                .iter()
                .find(|(cookie, _)| cookie == name)
                .map(|(_, value)| value.as_str())
        });
        if let Some(claims) = jwt::extract_claims(&cfg.jwt, jwt_cookie, jwt_header) {
            ctx.app_user_id = claims.app_user_id;
            ctx.jwt_additional_fields = claims.additional_fields;
        }

        if let (Some(raw), Some(secret)) = (pxde_raw.as_deref(), cfg.cookie_secret()) {
            ctx.data_enrichment = data_enrichment::decode_cookie(raw, secret, cfg.hmac_digest);
        }

        ctx.headers = headers;
        ctx
    }

    pub fn is_mobile(&self) -> bool {
        self.cookie_origin == CookieOrigin::Header
    }

    pub fn px_cookie(&self, name: &str) -> Option<&str> {
        self.px_cookies
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, &name.to_ascii_lowercase())
    }

    /// The v3 cookie wins when both names are present.
    pub fn primary_cookie(&self) -> Option<(&str, &str)> {
        [COOKIE_V3_NAME, COOKIE_V1_NAME]
            .into_iter()
            .find_map(|name| self.px_cookie(name).map(|value| (name, value)))
    }
}

/// `<version>:<token>` goes under the versioned cookie name; a bare value
/// (the SDK's error sentinels) is filed under `_px3`.
pub(crate) fn split_mobile_token(value: &str) -> (&'static str, &str) {
    match value.split_once(':') {
        Some((version, token)) if version.trim() == "3" => (COOKIE_V3_NAME, token),
        Some((_, token)) => (COOKIE_V1_NAME, token),
        None => (COOKIE_V3_NAME, value.trim()),
    }
}

fn find_header<'a>(headers: &'a [(String, String)], lowered_name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == lowered_name)
        .map(|(_, value)| value.as_str())
}

pub(crate) fn parse_cookie_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// First configured IP header wins (first entry of a comma list), then the
/// socket address.
fn resolve_client_ip(
    headers: &[(String, String)],
    ip_headers: &[String],
    remote_addr: &str,
) -> String {
    for name in ip_headers {
        let value = find_header(headers, name)
            .and_then(|value| value.split(',').next())
            .map(str::trim);
        if let Some(ip) = value.filter(|ip| !ip.is_empty() && *ip != "unknown") {
            return ip.to_string();
        }
    }
    remote_addr.trim().to_string()
}
