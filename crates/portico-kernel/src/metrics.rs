//! Per-request metrics record handed to reporters.

use crate::headers::HttpHeaders;
use serde::Serialize;

/// Captured request or response for logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogEntry {
    pub method: Option<String>,
    pub uri: Option<String>,
    pub status: Option<u16>,
    pub headers: HttpHeaders,
    pub body: Option<String>,
}

/// Request/response log attached to the metrics when API logging is on.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Log {
    pub api_id: String,
    pub request_id: String,
    pub timestamp_ms: u64,
    pub client_request: Option<LogEntry>,
    pub client_response: Option<LogEntry>,
}

/// Metrics of one request, filled in progressively by processors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub timestamp_ms: u64,
    pub request_id: String,
    pub transaction_id: String,
    pub api_id: Option<String>,
    pub api_name: Option<String>,
    pub plan_id: Option<String>,
    pub security_type: Option<String>,
    pub security_token: Option<String>,
    pub http_method: String,
    pub uri: String,
    pub path_info: String,
    pub mapped_path: Option<String>,
    pub host: String,
    pub local_address: String,
    pub remote_address: String,
    pub user_agent: Option<String>,
    pub status: u16,
    pub request_content_length: u64,
    pub response_content_length: u64,
    pub gateway_response_time_ms: u64,
    pub endpoint_response_time_ms: Option<u64>,
    pub gateway_latency_ms: Option<u64>,
    pub endpoint: Option<String>,
    pub error_key: Option<String>,
    pub error_message: Option<String>,
    pub log: Option<Log>,
}

impl Metrics {
    /// `true` once the record points at a deployed API.
    pub fn has_api(&self) -> bool {
        self.api_id.is_some()
    }
}
