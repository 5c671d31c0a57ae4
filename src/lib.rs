// src/lib.rs
// PerimeterX-compatible risk decision engine: cookie/token validation, remote
// risk fallback and fail-open PASS/BLOCK decisions for an HTTP middleware layer.

pub mod boundaries;       // Spin request adapter
pub mod config;           // Config loading, defaults and route sets
pub mod context;          // Per-request facts and accumulated evidence
pub mod crypto;           // PBKDF2/AES-CBC cookie codec and HMAC helpers
pub mod error;            // Failure taxonomy
pub mod input_validation; // Bounded body/query parsing
pub mod payload;          // v1/v3 cookie and token parsers
pub mod providers;        // HTTP client seam and remote risk evaluator
pub mod runtime;          // Decision orchestrator
pub mod signals;          // Cookie evaluator and side-channel extractors

#[cfg(test)]
mod test_support;

pub use config::{ConfigLoadError, EnforcerConfig, ModuleMode};
pub use context::{BlockAction, LoginCredentialsFields, RequestFacts, RiskContext};
pub use error::RiskError;
pub use providers::{HttpClient, HttpResponse, ReqwestHttpClient, TransportError};
pub use runtime::{Action, Decision, Enforcer, Verdict};
