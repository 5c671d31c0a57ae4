// src/runtime/decision.rs
// Decision orchestrator: cookie fast path, remote fallback, fail-open everywhere else.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{EnforcerConfig, ModuleMode};
use crate::context::{
    BlockAction, BlockReason, LoginCredentialsFields, PassReason, RequestFacts, RiskContext,
};
use crate::providers::contracts::HttpClient;
use crate::providers::risk_api::{RemoteOutcome, RemoteRiskEvaluator};
use crate::signals::cookie::{evaluate_cookie, CookieOutcome};
use crate::signals::credentials;
use crate::signals::data_enrichment::DataEnrichment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pass,
    Block,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Pass => "pass",
            Action::Block => "block",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub reason: &'static str,
}

impl Decision {
    fn pass(ctx: &mut RiskContext, reason: PassReason) -> Self {
        ctx.pass_reason = Some(reason);
        Self {
            action: Action::Pass,
            reason: reason.as_str(),
        }
    }

    fn block(ctx: &mut RiskContext, reason: BlockReason) -> Self {
        ctx.block_reason = Some(reason);
        Self {
            action: Action::Block,
            reason: reason.as_str(),
        }
    }
}

/// What the middleware layer receives for one request.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub action: Action,
    pub reason: &'static str,
    pub request_id: String,
    pub score: Option<i64>,
    pub uuid: Option<String>,
    pub vid: Option<String>,
    pub block_action: Option<BlockAction>,
    pub block_action_data: Option<String>,
    pub pxhd: Option<String>,
    pub data_enrichment: Option<DataEnrichment>,
    pub credentials: Option<LoginCredentialsFields>,
    pub module_mode: ModuleMode,
    pub enforced_route: bool,
    pub monitored_route: bool,
    pub bypass_monitor: bool,
}

impl Verdict {
    fn from_context(decision: Decision, ctx: RiskContext, mode: ModuleMode) -> Self {
        Self {
            action: decision.action,
            reason: decision.reason,
            request_id: ctx.request_id,
            score: ctx.score,
            uuid: ctx.uuid,
            vid: ctx.vid,
            block_action: ctx.block_action,
            block_action_data: ctx.block_action_data,
            pxhd: ctx.pxhd,
            data_enrichment: ctx.data_enrichment,
            credentials: ctx.credentials,
            module_mode: mode,
            enforced_route: ctx.enforced_route,
            monitored_route: ctx.monitored_route,
            bypass_monitor: ctx.bypass_monitor,
        }
    }

    /// Monitor mode still reports BLOCK decisions; only the enforcement
    /// switches decide whether the middleware acts on them.
    pub fn should_block(&self) -> bool {
        self.action == Action::Block
            && (self.module_mode == ModuleMode::ActiveBlocking
                || self.enforced_route
                || self.bypass_monitor)
            && !self.monitored_route
    }
}

pub struct Enforcer {
    cfg: Arc<EnforcerConfig>,
    remote: RemoteRiskEvaluator,
}

impl Enforcer {
    pub fn new(cfg: Arc<EnforcerConfig>, client: Arc<dyn HttpClient>) -> Self {
        let remote = RemoteRiskEvaluator::new(cfg.clone(), client);
        Self { cfg, remote }
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.cfg
    }

    /// Inside a Tokio runtime the risk call is bounded by `api_timeout_ms` on
    /// the Tokio timer. On any other executor the bound is whatever the
    /// `HttpClient` enforces for the timeout it is handed.
    pub async fn evaluate(&self, facts: &RequestFacts) -> Verdict {
        let mut ctx = RiskContext::new(facts, &self.cfg);
        ctx.credentials = self.extract_credentials(facts);
        let decision = self.decide(&mut ctx).await;
        tracing::debug!(
            request_id = ctx.request_id.as_str(),
            action = decision.action.as_str(),
            reason = decision.reason,
            score = ctx.score,
            "risk decision"
        );
        Verdict::from_context(decision, ctx, self.cfg.module_mode)
    }

    pub fn extract_credentials(&self, facts: &RequestFacts) -> Option<LoginCredentialsFields> {
        credentials::extract_credentials(facts, &self.cfg)
    }

    pub async fn decide(&self, ctx: &mut RiskContext) -> Decision {
        if ctx.ip.is_empty() || ctx.uri.is_empty() {
            tracing::debug!(request_id = ctx.request_id.as_str(), "request lacks ip or uri");
            return Decision::pass(ctx, PassReason::InvalidRequest);
        }
        if ctx.whitelist_route {
            return Decision::pass(ctx, PassReason::WhitelistRoute);
        }
        if self.cfg.is_filtered_user_agent(&ctx.user_agent) {
            return Decision::pass(ctx, PassReason::FilteredUserAgent);
        }
        if self.cfg.is_filtered_ip(&ctx.ip) {
            return Decision::pass(ctx, PassReason::FilteredIp);
        }

        let cookie = evaluate_cookie(ctx, &self.cfg, now_ms());
        match cookie {
            CookieOutcome::GoodScore => return Decision::pass(ctx, PassReason::Cookie),
            CookieOutcome::BadScore => return Decision::block(ctx, BlockReason::CookieHighScore),
            _ => {}
        }

        tracing::debug!(
            request_id = ctx.request_id.as_str(),
            outcome = cookie.as_str(),
            call_reason = ctx.call_reason.map(|reason| reason.as_str()),
            "cookie inconclusive, calling risk api"
        );
        match self.remote.evaluate(ctx).await {
            RemoteOutcome::GoodScore => Decision::pass(ctx, PassReason::S2s),
            RemoteOutcome::BadScore => {
                let reason = ctx.block_reason.unwrap_or(BlockReason::S2sHighScore);
                Decision::block(ctx, reason)
            }
            RemoteOutcome::TimeoutPass => Decision::pass(ctx, PassReason::S2sTimeout),
            RemoteOutcome::UnexpectedResult => Decision::pass(ctx, PassReason::S2sError),
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
