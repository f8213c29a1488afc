pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod grader;
pub mod languages;
pub mod materialize;
pub mod model;
pub mod pipeline;
pub mod routes;
pub mod store;
pub mod web_server;

use chrono::{SecondsFormat, Utc};

/// Returns the current UTC time, e.g. 2026-08-23T02:05:29.000Z
pub fn create_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
