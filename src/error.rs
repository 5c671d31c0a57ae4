// src/error.rs
// Failure taxonomy shared by the codec, payload parsers and remote evaluator

use thiserror::Error;

/// Every failure the decision engine can observe. None of these escape the
/// evaluator boundaries; they are folded into outcome enums there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    #[error("malformed cookie structure: {0}")]
    FormatInvalid(&'static str),
    #[error("cookie decryption failed")]
    DecryptionFailed,
    #[error("signature validation failed")]
    SignatureInvalid,
    #[error("payload expired")]
    Expired,
    #[error("remote risk call timed out")]
    NetworkTimeout,
    #[error("remote risk call failed: {0}")]
    NetworkError(String),
    #[error("invalid remote risk response: {0}")]
    InvalidRemoteResponse(String),
    #[error("missing configuration: {0}")]
    ConfigurationMissing(&'static str),
}

impl RiskError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskError::FormatInvalid(_) => "format_invalid",
            RiskError::DecryptionFailed => "decryption_failed",
            RiskError::SignatureInvalid => "signature_invalid",
            RiskError::Expired => "expired",
            RiskError::NetworkTimeout => "network_timeout",
            RiskError::NetworkError(_) => "network_error",
            RiskError::InvalidRemoteResponse(_) => "invalid_remote_response",
            RiskError::ConfigurationMissing(_) => "configuration_missing",
        }
    }
}
