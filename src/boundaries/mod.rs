// src/boundaries/mod.rs
// Inbound adapter: Spin HTTP requests into transport-neutral RequestFacts.

use std::net::SocketAddr;

use spin_sdk::http::{Method, Request};

use crate::context::RequestFacts;

/// Header Spin sets to the peer's `ip:port`.
const SPIN_CLIENT_ADDR_HEADER: &str = "spin-client-addr";

fn method_name(method: &Method) -> String {
    match method {
        Method::Get => "GET".to_string(),
        Method::Head => "HEAD".to_string(),
        Method::Post => "POST".to_string(),
        Method::Put => "PUT".to_string(),
        Method::Delete => "DELETE".to_string(),
        Method::Connect => "CONNECT".to_string(),
        Method::Options => "OPTIONS".to_string(),
        Method::Trace => "TRACE".to_string(),
        Method::Patch => "PATCH".to_string(),
        Method::Other(other) => other.to_ascii_uppercase(),
    }
}

fn strip_port(addr: &str) -> String {
    let trimmed = addr.trim();
    match trimmed.parse::<SocketAddr>() {
        Ok(socket) => socket.ip().to_string(),
        Err(_) => trimmed.to_string(),
    }
}

impl RequestFacts {
    /// An empty `remote_addr` falls back to the address Spin reports for the
    /// connection. Headers whose value is not valid UTF-8 are skipped.
    pub fn from_spin_request(req: &Request, remote_addr: &str) -> Self {
        let uri = match req.query() {
            "" => req.path().to_string(),
            query => format!("{}?{}", req.path(), query),
        };
        let headers: Vec<(String, String)> = req
            .headers()
            .filter_map(|(name, value)| {
                value
                    .as_str()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();

        let remote_addr = if remote_addr.trim().is_empty() {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(SPIN_CLIENT_ADDR_HEADER))
                .map(|(_, value)| strip_port(value))
                .unwrap_or_default()
        } else {
            strip_port(remote_addr)
        };

        let mut facts = RequestFacts::new(&method_name(req.method()), &uri);
        facts.remote_addr = remote_addr;
        facts.headers = headers;
        facts.body = req.body().to_vec();
        facts
    }
}
