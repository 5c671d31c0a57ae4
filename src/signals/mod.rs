// src/signals/mod.rs
// Request evidence extractors feeding the decision orchestrator.

pub mod cookie;
pub mod credentials;
pub mod data_enrichment;
pub mod graphql;
pub mod jwt;
pub mod original_token;
