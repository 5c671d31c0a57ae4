// src/providers/mod.rs
// Outbound collaborators: the HTTP client seam and the remote risk evaluator.

pub mod contracts;
pub mod reqwest_client;
pub mod risk_api;

pub use contracts::{HttpClient, HttpResponse, TransportError};
pub use reqwest_client::ReqwestHttpClient;
pub use risk_api::{build_request, RemoteOutcome, RemoteRiskEvaluator, RiskQuery};
