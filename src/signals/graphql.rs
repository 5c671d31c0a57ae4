// src/signals/graphql.rs
// GraphQL operation descriptors from a JSON request body (single or batched).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::config::EnforcerConfig;
use crate::input_validation::{parse_json_body, MAX_GRAPHQL_BODY_BYTES};

static OPERATION_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(query|mutation|subscription)\b\s*([A-Za-z_][A-Za-z0-9_]*)?")
        .expect("operation head regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphqlOperation {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub fn parse_operations(body: &[u8]) -> Vec<GraphqlOperation> {
    let document = match parse_json_body(body, MAX_GRAPHQL_BODY_BYTES) {
        Ok(document) => document,
        Err(err) => {
            tracing::debug!(error = err, "graphql body not parsed");
            return Vec::new();
        }
    };
    match &document {
        Value::Array(batch) => batch.iter().filter_map(parse_operation).collect(),
        Value::Object(_) => parse_operation(&document).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn parse_operation(entry: &Value) -> Option<GraphqlOperation> {
    let query = entry.get("query")?.as_str()?;
    let (op_type, query_name) = parse_query_head(query)?;
    let name = entry
        .get("operationName")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
        .or(query_name);
    Some(GraphqlOperation { op_type, name })
}

/// A document opening with `{` is shorthand for an anonymous query.
fn parse_query_head(query: &str) -> Option<(String, Option<String>)> {
    if query.trim_start().starts_with('{') {
        return Some(("query".to_string(), None));
    }
    let captures = OPERATION_HEAD.captures(query)?;
    let op_type = captures.get(1)?.as_str().to_string();
    let name = captures.get(2).map(|m| m.as_str().to_string());
    Some((op_type, name))
}

pub fn any_sensitive(operations: &[GraphqlOperation], cfg: &EnforcerConfig) -> bool {
    operations.iter().any(|op| {
        let sensitive_name = op.name.as_deref().is_some_and(|name| {
            cfg.sensitive_graphql_operation_names
                .iter()
                .any(|configured| configured == name)
        });
        let sensitive_type = cfg
            .sensitive_graphql_operation_types
            .iter()
            .any(|configured| configured.eq_ignore_ascii_case(&op.op_type));
        sensitive_name || sensitive_type
    })
}
