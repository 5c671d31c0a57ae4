// src/providers/risk_api.rs
// Remote risk evaluator: builds the server-to-server risk query, sends it under
// the configured timeout and folds the answer back into the RiskContext.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::EnforcerConfig;
use crate::context::{
    BlockAction, BlockReason, CallReason, RiskContext, S2SErrorInfo, S2SErrorReason, SsoStep,
};
use crate::error::RiskError;
use crate::providers::contracts::{HttpClient, HttpResponse, TransportError};
use crate::signals::data_enrichment;
use crate::signals::graphql::GraphqlOperation;

const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    GoodScore,
    BadScore,
    TimeoutPass,
    UnexpectedResult,
}

impl RemoteOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RemoteOutcome::GoodScore => "good_score",
            RemoteOutcome::BadScore => "bad_score",
            RemoteOutcome::TimeoutPass => "s2s_timeout_pass",
            RemoteOutcome::UnexpectedResult => "unexpected_result",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskRequest {
    pub ip: String,
    pub headers: Vec<HeaderEntry>,
    pub url: String,
    pub uri: String,
    pub first_party: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAdditional {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s2s_call_reason: Option<&'static str>,
    pub http_method: String,
    pub http_version: String,
    pub module_version: String,
    pub risk_mode: &'static str,
    pub cookie_origin: &'static str,
    pub request_cookie_names: Vec<String>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px_orig_cookie: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px_cookie: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px_cookie_hmac: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_token_error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px_decoded_original_token: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graphql_operations: Option<Vec<GraphqlOperation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_additional_fields: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_version: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_step: Option<SsoStep>,
}

/// Body of the server-to-server risk call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskQuery {
    pub request: RiskRequest,
    pub additional: RiskAdditional,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pxhd: Option<String>,
}

/// Only `score` and `action` carry the verdict. Everything else is read
/// leniently so an oddly typed side field cannot void a usable reply.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RiskResponse {
    status: Option<Value>,
    uuid: Option<Value>,
    score: Option<Value>,
    action: Option<Value>,
    action_data: Option<Value>,
    pxhd: Option<Value>,
    data_enrichment: Option<Value>,
    remote_config_id: Option<Value>,
    remote_config_version: Option<Value>,
    message: Option<Value>,
}

impl RiskResponse {
    /// Absent means success; a value that is not an integer is a failure.
    fn status_code(&self) -> i64 {
        match &self.status {
            None | Some(Value::Null) => 0,
            Some(value) => lenient_i64(value).unwrap_or(-1),
        }
    }

    fn score(&self) -> Option<i64> {
        self.score
            .as_ref()
            .and_then(Value::as_f64)
            .filter(|score| score.is_finite())
            .map(|score| score as i64)
    }

    fn action(&self) -> Option<&str> {
        self.action.as_ref().and_then(Value::as_str)
    }

    fn challenge_body(&self) -> Option<String> {
        self.action_data
            .as_ref()
            .and_then(|data| data.get("body"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

fn lenient_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Assembles the risk query from everything the request context collected.
pub fn build_request(ctx: &RiskContext, cfg: &EnforcerConfig) -> RiskQuery {
    let headers = ctx
        .headers
        .iter()
        .filter(|(name, _)| !cfg.is_sensitive_header(name))
        .map(|(name, value)| HeaderEntry {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();

    let px_orig_cookie = match ctx.call_reason {
        Some(CallReason::CookieDecryptionFailed) => ctx.px_orig_cookie.clone(),
        _ => None,
    };
    let px_cookie = match ctx.call_reason {
        Some(CallReason::CookieExpired | CallReason::CookieValidationFailed) => {
            ctx.decoded_cookie.clone()
        }
        _ => None,
    };
    let credentials = ctx.credentials.as_ref();

    RiskQuery {
        request: RiskRequest {
            ip: ctx.ip.clone(),
            headers,
            url: ctx.full_url.clone(),
            uri: ctx.uri.clone(),
            first_party: cfg.first_party_enabled,
        },
        additional: RiskAdditional {
            s2s_call_reason: ctx.call_reason.map(CallReason::as_str),
            http_method: ctx.method.clone(),
            http_version: ctx.http_version.clone(),
            module_version: cfg.module_version.clone(),
            risk_mode: cfg.module_mode.as_str(),
            cookie_origin: ctx.cookie_origin.as_str(),
            request_cookie_names: ctx.request_cookie_names.clone(),
            request_id: ctx.request_id.clone(),
            px_orig_cookie,
            px_cookie,
            px_cookie_hmac: ctx.cookie_hmac.clone().filter(|hmac| !hmac.is_empty()),
            original_uuid: ctx.original_uuid.clone(),
            original_token_error: ctx.original_token_error.map(|err| err.as_str()),
            original_token: ctx.original_token.clone(),
            px_decoded_original_token: ctx.decoded_original_token.clone(),
            graphql_operations: Some(ctx.graphql_operations.clone())
                .filter(|operations| !operations.is_empty()),
            app_user_id: ctx.app_user_id.clone(),
            jwt_additional_fields: ctx.jwt_additional_fields.clone(),
            user: credentials.and_then(|c| c.username.clone()),
            pass: credentials.and_then(|c| c.password.clone()),
            ci_version: credentials.map(|c| c.version.as_str()),
            sso_step: credentials.and_then(|c| c.sso_step),
        },
        vid: ctx.vid.clone().filter(|vid| !vid.is_empty()),
        uuid: ctx.uuid.clone().filter(|uuid| !uuid.is_empty()),
        pxhd: ctx.pxhd.clone(),
    }
}

pub struct RemoteRiskEvaluator {
    cfg: Arc<EnforcerConfig>,
    client: Arc<dyn HttpClient>,
}

impl RemoteRiskEvaluator {
    pub fn new(cfg: Arc<EnforcerConfig>, client: Arc<dyn HttpClient>) -> Self {
        Self { cfg, client }
    }

    fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        match self.cfg.auth_token() {
            Some(token) => headers.push(("Authorization".to_string(), format!("Bearer {}", token))),
            None => tracing::warn!("risk api auth token not configured"),
        }
        headers
    }

    /// Sends the query and classifies the reply. Only a numeric score at or
    /// above the blocking threshold yields `BadScore`; a timeout yields
    /// `TimeoutPass` and every other failure `UnexpectedResult`, with the
    /// cause recorded in `ctx.s2s_error`.
    pub async fn evaluate(&self, ctx: &mut RiskContext) -> RemoteOutcome {
        let query = build_request(ctx, &self.cfg);
        let body = match serde_json::to_string(&query) {
            Ok(body) => body,
            Err(err) => {
                ctx.s2s_error = Some(error_info(S2SErrorReason::UnknownError, err.to_string()));
                return RemoteOutcome::UnexpectedResult;
            }
        };

        let response = match self.send(&body).await {
            Ok(response) => response,
            Err(RiskError::NetworkTimeout) => {
                tracing::warn!(
                    request_id = ctx.request_id.as_str(),
                    timeout_ms = self.cfg.api_timeout_ms,
                    "risk api call timed out"
                );
                return RemoteOutcome::TimeoutPass;
            }
            Err(err) => {
                tracing::warn!(request_id = ctx.request_id.as_str(), error = %err, "risk api call failed");
                ctx.s2s_error = Some(error_info(S2SErrorReason::UnableToSendRequest, err.to_string()));
                return RemoteOutcome::UnexpectedResult;
            }
        };

        match self.interpret(ctx, &response) {
            Ok(outcome) => outcome,
            Err(info) => {
                tracing::warn!(
                    request_id = ctx.request_id.as_str(),
                    reason = info.reason.as_str(),
                    message = info.message.as_str(),
                    "risk api returned an unusable response"
                );
                ctx.s2s_error = Some(info);
                RemoteOutcome::UnexpectedResult
            }
        }
    }

    /// The in-flight call is dropped when the timeout elapses, so a late
    /// reply is never observed.
    async fn send(&self, body: &str) -> Result<HttpResponse, RiskError> {
        let timeout = Duration::from_millis(self.cfg.api_timeout_ms);
        let url = self.cfg.risk_api_url();
        let headers = self.request_headers();
        let call = self.client.post(&url, &headers, body, timeout);
        // Outside a Tokio runtime the transport's own timeout is the only bound.
        let result = if tokio::runtime::Handle::try_current().is_ok() {
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => return Err(RiskError::NetworkTimeout),
            }
        } else {
            call.await
        };
        match result {
            Err(TransportError::Timeout) => Err(RiskError::NetworkTimeout),
            Err(TransportError::Connection(message)) => Err(RiskError::NetworkError(message)),
            Ok(response) => Ok(response),
        }
    }

    fn interpret(
        &self,
        ctx: &mut RiskContext,
        response: &HttpResponse,
    ) -> Result<RemoteOutcome, S2SErrorInfo> {
        match response.status {
            200..=299 => {}
            status @ 400..=499 => return Err(http_error(S2SErrorReason::BadRequest, status, response)),
            status @ 500..=599 => return Err(http_error(S2SErrorReason::ServerError, status, response)),
            status => return Err(http_error(S2SErrorReason::UnknownError, status, response)),
        }

        let parsed: RiskResponse = serde_json::from_str(&response.body).map_err(|err| {
            error_info(
                S2SErrorReason::InvalidResponse,
                RiskError::InvalidRemoteResponse(err.to_string()).to_string(),
            )
        })?;

        self.apply_side_info(ctx, &parsed);

        let status = parsed.status_code();
        if status != 0 {
            let message = lenient_string(parsed.message.as_ref())
                .unwrap_or_else(|| format!("risk api status {}", status));
            return Err(error_info(S2SErrorReason::RequestFailedOnServer, message));
        }

        let (Some(score), Some(action)) = (parsed.score(), parsed.action()) else {
            return Err(error_info(
                S2SErrorReason::InvalidResponse,
                RiskError::InvalidRemoteResponse("missing score or action".to_string()).to_string(),
            ));
        };

        ctx.score = Some(score);
        if let Some(uuid) = lenient_string(parsed.uuid.as_ref()).filter(|uuid| !uuid.is_empty()) {
            ctx.uuid = Some(uuid);
        }

        if score < i64::from(self.cfg.blocking_score) {
            return Ok(RemoteOutcome::GoodScore);
        }

        let block_action = BlockAction::from_code(action);
        ctx.block_action = Some(block_action);
        let challenge_body = parsed.challenge_body();
        ctx.block_reason = Some(match (block_action, challenge_body) {
            (BlockAction::Challenge, Some(body)) => {
                ctx.block_action_data = Some(body);
                BlockReason::Challenge
            }
            (BlockAction::RateLimit, _) => BlockReason::ExceededRateLimit,
            _ => BlockReason::S2sHighScore,
        });
        Ok(RemoteOutcome::BadScore)
    }

    fn apply_side_info(&self, ctx: &mut RiskContext, parsed: &RiskResponse) {
        if let Some(pxhd) = lenient_string(parsed.pxhd.as_ref()).filter(|pxhd| !pxhd.is_empty()) {
            ctx.pxhd = Some(pxhd);
        }
        if let Some(enrichment) = parsed.data_enrichment.as_ref().and_then(data_enrichment::from_remote) {
            ctx.data_enrichment = Some(enrichment);
        }
        ctx.remote_config_stale = is_remote_config_stale(
            &self.cfg,
            lenient_string(parsed.remote_config_id.as_ref()).as_deref(),
            parsed.remote_config_version.as_ref().and_then(lenient_i64),
        );
    }
}

fn is_remote_config_stale(
    cfg: &EnforcerConfig,
    remote_id: Option<&str>,
    remote_version: Option<i64>,
) -> bool {
    let id_changed = match (remote_id, cfg.remote_config_id.as_deref()) {
        (Some(remote), Some(local)) => remote != local,
        (Some(_), None) => true,
        _ => false,
    };
    let newer_version = match (remote_version, cfg.remote_config_version) {
        (Some(remote), Some(local)) => remote > local,
        (Some(_), None) => true,
        _ => false,
    };
    id_changed || newer_version
}

fn error_info(reason: S2SErrorReason, message: String) -> S2SErrorInfo {
    S2SErrorInfo {
        reason,
        message,
        http_status: None,
        http_message: None,
    }
}

fn http_error(reason: S2SErrorReason, status: u16, response: &HttpResponse) -> S2SErrorInfo {
    S2SErrorInfo {
        reason,
        message: format!("risk api responded with http {}", status),
        http_status: Some(status),
        http_message: Some(response.body.chars().take(MAX_ERROR_BODY_CHARS).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CiProtocolVersion;
    use crate::context::{LoginCredentialsFields, OriginalTokenError, RequestFacts};
    use crate::test_support::{test_config, MockHttpClient, MockReply, TEST_IP, TEST_UA};
    use serde_json::json;

    fn ctx_for(cfg: &EnforcerConfig) -> RiskContext {
        let facts = RequestFacts::new("POST", "/checkout?step=2")
            .with_remote_addr(TEST_IP)
            .with_header("Host", "shop.example.com")
            .with_header("User-Agent", TEST_UA)
            .with_header("Cookie", "_px3=broken; _pxhd=hd-1")
            .with_header("X-Trace", "t-1");
        RiskContext::new(&facts, cfg)
    }

    fn evaluator(cfg: &Arc<EnforcerConfig>, client: &Arc<MockHttpClient>) -> RemoteRiskEvaluator {
        RemoteRiskEvaluator::new(cfg.clone(), client.clone())
    }

    #[test]
    fn query_filters_sensitive_headers_and_carries_call_reason() {
        let cfg = test_config(r#"{"module_mode": "active_blocking"}"#);
        let mut ctx = ctx_for(&cfg);
        ctx.call_reason = Some(CallReason::CookieDecryptionFailed);
        ctx.px_orig_cookie = Some("broken".to_string());

        let query = serde_json::to_value(build_request(&ctx, &cfg)).unwrap();
        let names: Vec<&str> = query["request"]["headers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["host", "user-agent", "x-trace"]);
        assert_eq!(query["request"]["url"], "https://shop.example.com/checkout?step=2");
        assert_eq!(query["request"]["ip"], TEST_IP);
        assert_eq!(query["additional"]["s2s_call_reason"], "cookie_decryption_failed");
        assert_eq!(query["additional"]["px_orig_cookie"], "broken");
        assert_eq!(query["additional"]["risk_mode"], "active_blocking");
        assert_eq!(query["additional"]["http_method"], "POST");
        assert_eq!(query["additional"]["cookie_origin"], "cookie");
        assert_eq!(query["pxhd"], "hd-1");
        assert!(query["additional"].get("px_cookie").is_none());
        assert!(query.get("vid").is_none());
    }

    #[test]
    fn query_attaches_decoded_cookie_only_for_expired_or_unsigned() {
        let cfg = test_config("{}");
        let mut ctx = ctx_for(&cfg);
        ctx.decoded_cookie = Some(json!({"s": 0}));
        ctx.px_orig_cookie = Some("broken".to_string());

        ctx.call_reason = Some(CallReason::CookieExpired);
        let query = serde_json::to_value(build_request(&ctx, &cfg)).unwrap();
        assert_eq!(query["additional"]["px_cookie"], json!({"s": 0}));
        assert!(query["additional"].get("px_orig_cookie").is_none());

        ctx.call_reason = Some(CallReason::SensitiveRoute);
        let query = serde_json::to_value(build_request(&ctx, &cfg)).unwrap();
        assert!(query["additional"].get("px_cookie").is_none());
    }

    #[test]
    fn query_carries_mobile_and_credentials_evidence() {
        let cfg = test_config("{}");
        let mut ctx = ctx_for(&cfg);
        ctx.original_uuid = Some("orig-uuid".to_string());
        ctx.original_token_error = Some(OriginalTokenError::ValidationFailed);
        ctx.credentials = Some(LoginCredentialsFields {
            username: Some("user-hash".to_string()),
            password: None,
            raw_username: Some("jane".to_string()),
            version: CiProtocolVersion::MultistepSso,
            sso_step: Some(SsoStep::User),
        });

        let query = serde_json::to_value(build_request(&ctx, &cfg)).unwrap();
        let additional = &query["additional"];
        assert_eq!(additional["original_uuid"], "orig-uuid");
        assert_eq!(additional["original_token_error"], "validation_failed");
        assert_eq!(additional["user"], "user-hash");
        assert!(additional.get("pass").is_none());
        assert_eq!(additional["ci_version"], "multistep_sso");
        assert_eq!(additional["sso_step"], "user");
    }

    #[tokio::test]
    async fn low_score_passes_and_records_side_info() {
        let cfg = test_config(
            r#"{"auth_token": "tok", "blocking_score": 70, "remote_config_id": "cfg-1",
                "remote_config_version": 3}"#,
        );
        let client = Arc::new(MockHttpClient::json(
            200,
            json!({"status": 0, "uuid": "remote-uuid", "score": 10, "action": "c",
                   "pxhd": "new-hd", "data_enrichment": {"breached_account": true},
                   "remote_config_id": "cfg-1", "remote_config_version": 4}),
        ));
        let mut ctx = ctx_for(&cfg);
        ctx.call_reason = Some(CallReason::NoCookie);

        let outcome = evaluator(&cfg, &client).evaluate(&mut ctx).await;
        assert_eq!(outcome, RemoteOutcome::GoodScore);
        assert_eq!(ctx.score, Some(10));
        assert_eq!(ctx.uuid.as_deref(), Some("remote-uuid"));
        assert_eq!(ctx.pxhd.as_deref(), Some("new-hd"));
        assert!(ctx.data_enrichment.as_ref().is_some_and(|de| de.breached_account()));
        assert!(ctx.remote_config_stale);

        assert_eq!(client.calls(), 1);
        assert_eq!(client.sent_header("authorization").as_deref(), Some("Bearer tok"));
        assert_eq!(client.sent_header("content-type").as_deref(), Some("application/json"));
        assert_eq!(client.sent_json()["additional"]["s2s_call_reason"], "no_cookie");
        let url = client.last_url.lock().unwrap().clone().unwrap();
        assert!(url.ends_with("/api/v3/risk"));
    }

    #[tokio::test]
    async fn high_score_maps_action_to_block_reason() {
        let cfg = test_config(r#"{"blocking_score": 70}"#);
        let cases = [
            (json!({"status": 0, "score": 100, "action": "j", "action_data": {"body": "<html/>"}}),
             BlockAction::Challenge, BlockReason::Challenge),
            (json!({"status": 0, "score": 100, "action": "r"}),
             BlockAction::RateLimit, BlockReason::ExceededRateLimit),
            (json!({"status": 0, "score": 70, "action": "b"}),
             BlockAction::Block, BlockReason::S2sHighScore),
            (json!({"status": 0, "score": 90, "action": "j"}),
             BlockAction::Challenge, BlockReason::S2sHighScore),
        ];
        for (reply, action, reason) in cases {
            let client = Arc::new(MockHttpClient::json(200, reply));
            let mut ctx = ctx_for(&cfg);
            let outcome = evaluator(&cfg, &client).evaluate(&mut ctx).await;
            assert_eq!(outcome, RemoteOutcome::BadScore);
            assert_eq!(ctx.block_action, Some(action));
            assert_eq!(ctx.block_reason, Some(reason));
        }

        let client = Arc::new(MockHttpClient::json(
            200,
            json!({"status": 0, "score": 100, "action": "j", "action_data": {"body": "<html/>"}}),
        ));
        let mut ctx = ctx_for(&cfg);
        evaluator(&cfg, &client).evaluate(&mut ctx).await;
        assert_eq!(ctx.block_action_data.as_deref(), Some("<html/>"));
    }

    #[tokio::test]
    async fn hanging_transport_times_out_to_pass() {
        let cfg = test_config(r#"{"api_timeout_ms": 100}"#);
        let client = Arc::new(MockHttpClient::new(MockReply::Hang));
        let mut ctx = ctx_for(&cfg);
        let outcome = evaluator(&cfg, &client).evaluate(&mut ctx).await;
        assert_eq!(outcome, RemoteOutcome::TimeoutPass);
        assert!(ctx.score.is_none());
        assert!(ctx.s2s_error.is_none());
    }

    #[tokio::test]
    async fn transport_timeout_is_a_timeout_pass() {
        let cfg = test_config("{}");
        let client = Arc::new(MockHttpClient::new(MockReply::Fail(TransportError::Timeout)));
        let mut ctx = ctx_for(&cfg);
        let outcome = evaluator(&cfg, &client).evaluate(&mut ctx).await;
        assert_eq!(outcome, RemoteOutcome::TimeoutPass);
    }

    #[tokio::test]
    async fn failures_record_error_reason() {
        let cfg = test_config("{}");
        let cases = [
            (MockReply::Fail(TransportError::Connection("refused".to_string())),
             S2SErrorReason::UnableToSendRequest, None),
            (MockReply::Respond(400, "bad".to_string()), S2SErrorReason::BadRequest, Some(400)),
            (MockReply::Respond(503, "down".to_string()), S2SErrorReason::ServerError, Some(503)),
            (MockReply::Respond(200, "not json".to_string()), S2SErrorReason::InvalidResponse, None),
            (MockReply::Respond(200, json!({"status": 0, "action": "c"}).to_string()),
             S2SErrorReason::InvalidResponse, None),
            (MockReply::Respond(200, json!({"status": 0, "score": 10}).to_string()),
             S2SErrorReason::InvalidResponse, None),
            (MockReply::Respond(200, json!({"status": -1, "message": "bad app"}).to_string()),
             S2SErrorReason::RequestFailedOnServer, None),
            (MockReply::Respond(200, json!({"status": "broken", "score": 10, "action": "c"}).to_string()),
             S2SErrorReason::RequestFailedOnServer, None),
        ];
        for (reply, reason, http_status) in cases {
            let client = Arc::new(MockHttpClient::new(reply));
            let mut ctx = ctx_for(&cfg);
            let outcome = evaluator(&cfg, &client).evaluate(&mut ctx).await;
            assert_eq!(outcome, RemoteOutcome::UnexpectedResult);
            let info = ctx.s2s_error.expect("error recorded");
            assert_eq!(info.reason, reason);
            assert_eq!(info.http_status, http_status);
        }
    }

    #[tokio::test]
    async fn loosely_typed_side_fields_do_not_void_a_good_score() {
        let cfg = test_config(
            r#"{"blocking_score": 70, "remote_config_id": "7", "remote_config_version": 3}"#,
        );
        let client = Arc::new(MockHttpClient::json(
            200,
            json!({"status": "0", "score": 10, "action": "c", "uuid": 42,
                   "action_data": "none", "remote_config_id": 7, "remote_config_version": "4"}),
        ));
        let mut ctx = ctx_for(&cfg);
        let outcome = evaluator(&cfg, &client).evaluate(&mut ctx).await;
        assert_eq!(outcome, RemoteOutcome::GoodScore);
        assert_eq!(ctx.score, Some(10));
        assert_eq!(ctx.uuid.as_deref(), Some("42"));
        assert!(ctx.s2s_error.is_none());
        assert!(ctx.remote_config_stale);

        let client = Arc::new(MockHttpClient::json(200, json!({"score": 10, "action": "c"})));
        let mut ctx = ctx_for(&cfg);
        let outcome = evaluator(&cfg, &client).evaluate(&mut ctx).await;
        assert_eq!(outcome, RemoteOutcome::GoodScore);
        assert!(!ctx.remote_config_stale);
    }

    #[test]
    fn remote_config_staleness_compares_id_and_version() {
        let cfg = test_config(r#"{"remote_config_id": "a", "remote_config_version": 5}"#);
        assert!(!is_remote_config_stale(&cfg, Some("a"), Some(5)));
        assert!(!is_remote_config_stale(&cfg, None, Some(4)));
        assert!(is_remote_config_stale(&cfg, Some("b"), Some(5)));
        assert!(is_remote_config_stale(&cfg, Some("a"), Some(6)));
        assert!(!is_remote_config_stale(&cfg, None, None));
    }
}
