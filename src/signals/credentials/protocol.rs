// src/signals/credentials/protocol.rs
// Versioned login-credential hashing.

use crate::config::CiProtocolVersion;
use crate::context::{LoginCredentialsFields, SsoStep};
use crate::crypto::sha256_hex;

pub trait CredentialsProtocol: Sync {
    fn version(&self) -> CiProtocolVersion;

    /// `None` unless the fields this protocol requires are all present.
    fn process(&self, username: Option<&str>, password: Option<&str>)
        -> Option<LoginCredentialsFields>;
}

pub struct V1Protocol;
pub struct V2Protocol;
pub struct MultistepSsoProtocol;

pub fn protocol_for(version: CiProtocolVersion) -> &'static dyn CredentialsProtocol {
    match version {
        CiProtocolVersion::V1 => &V1Protocol,
        CiProtocolVersion::V2 => &V2Protocol,
        CiProtocolVersion::MultistepSso => &MultistepSsoProtocol,
    }
}

impl CredentialsProtocol for V1Protocol {
    fn version(&self) -> CiProtocolVersion {
        CiProtocolVersion::V1
    }

    fn process(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Option<LoginCredentialsFields> {
        let (username, password) = (username?, password?);
        Some(LoginCredentialsFields {
            username: Some(sha256_hex(username)),
            password: Some(sha256_hex(password)),
            raw_username: Some(username.to_string()),
            version: self.version(),
            sso_step: None,
        })
    }
}

impl CredentialsProtocol for V2Protocol {
    fn version(&self) -> CiProtocolVersion {
        CiProtocolVersion::V2
    }

    /// The password hash is salted with the normalized username hash.
    fn process(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Option<LoginCredentialsFields> {
        let (username, password) = (username?, password?);
        let username_hash = sha256_hex(&normalize_username(username));
        let password_hash = sha256_hex(&format!("{}{}", username_hash, sha256_hex(password)));
        Some(LoginCredentialsFields {
            username: Some(username_hash),
            password: Some(password_hash),
            raw_username: Some(username.to_string()),
            version: self.version(),
            sso_step: None,
        })
    }
}

impl CredentialsProtocol for MultistepSsoProtocol {
    fn version(&self) -> CiProtocolVersion {
        CiProtocolVersion::MultistepSso
    }

    fn process(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Option<LoginCredentialsFields> {
        let sso_step = match (username, password) {
            (None, None) => return None,
            (Some(_), None) => Some(SsoStep::User),
            (None, Some(_)) => Some(SsoStep::Pass),
            (Some(_), Some(_)) => None,
        };
        Some(LoginCredentialsFields {
            username: username.map(str::to_string),
            password: password.map(sha256_hex),
            raw_username: username.map(str::to_string),
            version: self.version(),
            sso_step,
        })
    }
}

/// Email usernames only: lower-cased, `+tag` dropped from the local part,
/// and dots dropped from gmail local parts. Anything else is returned as is.
pub fn normalize_username(username: &str) -> String {
    let Some((local, domain)) = username.rsplit_once('@') else {
        return username.to_string();
    };
    if local.is_empty() || domain.is_empty() {
        return username.to_string();
    }
    let domain = domain.to_lowercase();
    let mut local = local.to_lowercase();
    if let Some(plus) = local.find('+') {
        local.truncate(plus);
    }
    if domain == "gmail.com" {
        local.retain(|c| c != '.');
    }
    format!("{}@{}", local, domain)
}
