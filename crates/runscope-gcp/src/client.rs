use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use runscope_logs::{LogProvider, ProviderError};
use runscope_types::{LogEntry, severity};

use crate::GcpError;
use crate::token::TokenSource;

/// Cloud Logging v2 list endpoint
pub const ENTRIES_LIST_URL: &str = "https://logging.googleapis.com/v2/entries:list";

/// Largest page the API accepts
const MAX_PAGE_SIZE: usize = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListLogEntriesRequest<'a> {
    resource_names: Vec<String>,
    filter: &'a str,
    order_by: &'static str,
    page_size: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListLogEntriesResponse {
    #[serde(default)]
    entries: Vec<ApiLogEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLogEntry {
    timestamp: Option<DateTime<Utc>>,
    receive_timestamp: Option<DateTime<Utc>>,
    severity: Option<String>,
    text_payload: Option<String>,
    json_payload: Option<Value>,
}

/// Log provider for Cloud Run services backed by the Cloud Logging API
pub struct CloudLoggingProvider {
    http: reqwest::Client,
    project_id: String,
    endpoint: String,
    tokens: TokenSource,
}

impl CloudLoggingProvider {
    /// Create a provider for a project, authenticating through gcloud
    pub fn new(project_id: impl Into<String>) -> Result<Self, GcpError> {
        let project_id = project_id.into();
        let tokens = TokenSource::for_project(&project_id);
        Self::with_token_source(project_id, tokens)
    }

    pub fn with_token_source(
        project_id: impl Into<String>,
        tokens: TokenSource,
    ) -> Result<Self, GcpError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("runscope/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            project_id: project_id.into(),
            endpoint: ENTRIES_LIST_URL.to_string(),
            tokens,
        })
    }

    /// Point at a different API endpoint (e.g. a local emulator)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn list_entries(&self, filter: &str, page_size: usize) -> Result<Vec<LogEntry>, GcpError> {
        let request = ListLogEntriesRequest {
            resource_names: vec![format!("projects/{}", self.project_id)],
            filter,
            order_by: "timestamp asc",
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        };

        let token = self.tokens.token().await?;
        let mut response = self.send(&request, &token).await?;

        // A cached token may have been revoked; retry once with a fresh one
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(project = %self.project_id, "access token rejected, refreshing");
            self.tokens.invalidate();
            let token = self.tokens.refresh().await?;
            response = self.send(&request, &token).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GcpError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let body: ListLogEntriesResponse = response.json().await?;
        debug!(count = body.entries.len(), "listed log entries");
        Ok(body.entries.into_iter().filter_map(convert_entry).collect())
    }

    async fn send(
        &self,
        request: &ListLogEntriesRequest<'_>,
        token: &str,
    ) -> Result<reqwest::Response, GcpError> {
        Ok(self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?)
    }
}

impl LogProvider for CloudLoggingProvider {
    fn base_filter(&self, source_id: &str) -> String {
        format!(
            r#"resource.type="cloud_run_revision" resource.labels.service_name="{}""#,
            source_id
        )
    }

    fn build_filter(&self, base_filter: &str, cutoff: Option<DateTime<Utc>>) -> String {
        match cutoff {
            Some(ts) => format!(
                r#"{} AND timestamp>="{}""#,
                base_filter,
                ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
            ),
            None => base_filter.to_string(),
        }
    }

    async fn fetch_logs(
        &self,
        filter: &str,
        page_size: usize,
    ) -> Result<Vec<LogEntry>, ProviderError> {
        Ok(self.list_entries(filter, page_size).await?)
    }
}

/// Map an API record onto a log entry; records without any timestamp are dropped
fn convert_entry(entry: ApiLogEntry) -> Option<LogEntry> {
    let timestamp = entry.timestamp.or(entry.receive_timestamp)?;

    let severity = entry
        .severity
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| severity::DEFAULT.to_string());

    let message = match (entry.text_payload, entry.json_payload) {
        (Some(text), _) => text,
        (None, Some(json)) => json_message(&json),
        (None, None) => String::new(),
    };

    Some(LogEntry::new(timestamp, severity, message))
}

/// Structured payloads usually carry a `message` field; fall back to compact JSON
fn json_message(payload: &Value) -> String {
    match payload.get("message") {
        Some(Value::String(message)) => message.clone(),
        _ => payload.to_string(),
    }
}

/// Pull `error.message` out of an API error body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> CloudLoggingProvider {
        CloudLoggingProvider::with_token_source("demo-project", TokenSource::fixed("t")).unwrap()
    }

    #[test]
    fn test_filters() {
        let p = provider();
        let base = p.base_filter("api-backend");
        assert_eq!(
            base,
            r#"resource.type="cloud_run_revision" resource.labels.service_name="api-backend""#
        );
        assert_eq!(p.build_filter(&base, None), base);

        let cutoff: DateTime<Utc> = "2024-01-15T10:30:00.000000001Z".parse().unwrap();
        assert!(p
            .build_filter(&base, Some(cutoff))
            .ends_with(r#" AND timestamp>="2024-01-15T10:30:00.000000001Z""#));
    }

    #[test]
    fn test_request_shape() {
        let request = ListLogEntriesRequest {
            resource_names: vec!["projects/demo".to_string()],
            filter: "f",
            order_by: "timestamp asc",
            page_size: 100,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["resourceNames"][0], "projects/demo");
        assert_eq!(json["orderBy"], "timestamp asc");
        assert_eq!(json["pageSize"], 100);
    }

    #[test]
    fn test_response_mapping() {
        let body = r#"{
            "entries": [
                {"timestamp": "2024-01-15T10:30:00.5Z", "severity": "ERROR", "textPayload": "boom"},
                {"timestamp": "2024-01-15T10:30:01Z", "jsonPayload": {"message": "structured", "code": 7}},
                {"receiveTimestamp": "2024-01-15T10:30:02Z", "severity": "", "jsonPayload": {"code": 7}},
                {"severity": "INFO", "textPayload": "no time"}
            ],
            "nextPageToken": "abc"
        }"#;
        let response: ListLogEntriesResponse = serde_json::from_str(body).unwrap();
        let entries: Vec<_> = response.entries.into_iter().filter_map(convert_entry).collect();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].severity, "ERROR");
        assert_eq!(entries[0].message, "boom");
        assert_eq!(entries[1].severity, "DEFAULT");
        assert_eq!(entries[1].message, "structured");
        assert_eq!(entries[2].severity, "DEFAULT");
        assert_eq!(entries[2].message, r#"{"code":7}"#);
    }

    #[test]
    fn test_empty_response() {
        let response: ListLogEntriesResponse = serde_json::from_str("{}").unwrap();
        assert!(response.entries.is_empty());
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error":{"code":403,"message":"Permission denied","status":"PERMISSION_DENIED"}}"#;
        assert_eq!(api_error_message(body), "Permission denied");
        assert_eq!(api_error_message(" upstream broke \n"), "upstream broke");
    }
}
