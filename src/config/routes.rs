// src/config/routes.rs
// Route patterns (prefix or regex) and IP/CIDR filters used by the config predicates.

use std::net::IpAddr;

use ipnet::IpNet;
use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RouteSpec {
    Prefix(String),
    Regex { regex: String },
}

/// A configured route: plain strings match as path prefixes, `{"regex": ..}`
/// entries are compiled once at load.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RouteSpec")]
pub enum RoutePattern {
    Prefix(String),
    Regex(Regex),
}

impl TryFrom<RouteSpec> for RoutePattern {
    type Error = regex::Error;

    fn try_from(spec: RouteSpec) -> Result<Self, Self::Error> {
        match spec {
            RouteSpec::Prefix(prefix) => Ok(RoutePattern::Prefix(prefix)),
            RouteSpec::Regex { regex } => Regex::new(&regex).map(RoutePattern::Regex),
        }
    }
}

impl RoutePattern {
    pub fn prefix(value: &str) -> Self {
        RoutePattern::Prefix(value.to_string())
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            RoutePattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
            RoutePattern::Regex(regex) => regex.is_match(path),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RouteSet(Vec<RoutePattern>);

impl RouteSet {
    pub fn new(patterns: Vec<RoutePattern>) -> Self {
        Self(patterns)
    }

    /// Matches against the path component only; any query string is ignored.
    pub fn matches(&self, uri: &str) -> bool {
        let path = uri.split('?').next().unwrap_or(uri);
        self.0.iter().any(|pattern| pattern.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Client address filter entry. Accepts CIDR notation or a bare address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct IpFilter(IpNet);

impl TryFrom<String> for IpFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if let Ok(net) = trimmed.parse::<IpNet>() {
            return Ok(IpFilter(net));
        }
        trimmed
            .parse::<IpAddr>()
            .map(|addr| IpFilter(IpNet::from(addr)))
            .map_err(|_| format!("invalid ip filter entry {}", value))
    }
}

impl IpFilter {
    pub fn contains(&self, ip: &str) -> bool {
        ip.trim()
            .parse::<IpAddr>()
            .map(|addr| self.0.contains(&addr))
            .unwrap_or(false)
    }
}
