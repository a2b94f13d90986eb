//! Serde types for backend search responses and error bodies.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A successful search response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawResponse {
    /// Backend-reported execution time in milliseconds.
    pub took: u64,

    /// True when at least one shard gave up before finishing.
    pub timed_out: bool,

    pub hits: HitsBlock,

    /// Suggestion groups keyed by suggester name.
    pub suggest: BTreeMap<String, Vec<SuggestEntry>>,
}

impl RawResponse {
    pub fn hit_count(&self) -> usize {
        self.hits.hits.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HitsBlock {
    pub total: TotalHits,
    pub max_score: Option<f64>,
    pub hits: Vec<RawHit>,
}

/// Total hit count, either a plain number or `{value, relation}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Tracked { value: u64, relation: String },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(value) => *value,
            TotalHits::Tracked { value, .. } => *value,
        }
    }
}

impl Default for TotalHits {
    fn default() -> Self {
        TotalHits::Count(0)
    }
}

/// A single hit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_index", default)]
    pub index: String,

    #[serde(rename = "_id", default)]
    pub id: String,

    #[serde(rename = "_score", default)]
    pub score: Option<f64>,

    #[serde(rename = "_source", default)]
    pub source: HitSource,

    /// Highlight fragments keyed by field name.
    #[serde(default)]
    pub highlight: BTreeMap<String, Vec<String>>,
}

/// Stored fields of a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HitSource {
    pub namespace: i32,
    pub namespace_text: Option<String>,
    pub title: String,
    pub redirect: Vec<RedirectRef>,
    pub text_bytes: Option<u64>,
    pub word_count: Option<u64>,
    pub timestamp: Option<String>,
}

/// A redirect pointing at the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectRef {
    pub namespace: i32,
    pub title: String,
}

/// One analyzed span of the suggested text and its candidate replacements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestEntry {
    pub text: String,
    pub offset: usize,
    pub length: usize,
    pub options: Vec<SuggestOption>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestOption {
    pub text: String,
    pub highlighted: Option<String>,
    pub score: f64,
}

/// A node in the backend's error cause chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorCause {
    #[serde(rename = "type")]
    pub error_type: String,

    pub reason: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Box<ErrorCause>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub root_cause: Vec<ErrorCause>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_shards: Vec<ShardFailure>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub script_stack: Vec<String>,
}

impl ErrorCause {
    pub fn new(error_type: impl Into<String>, reason: impl Into<String>) -> Self {
        ErrorCause {
            error_type: error_type.into(),
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_caused_by(mut self, cause: ErrorCause) -> Self {
        self.caused_by = Some(Box::new(cause));
        self
    }

    pub fn with_root_cause(mut self, cause: ErrorCause) -> Self {
        self.root_cause.push(cause);
        self
    }

    pub fn with_failed_shard(mut self, reason: ErrorCause) -> Self {
        self.failed_shards.push(ShardFailure {
            shard: Some(0),
            index: None,
            reason: Some(reason),
        });
        self
    }

    /// `type: reason (deepest cause -> ... -> nearest cause)`.
    pub fn format_message(&self) -> String {
        let mut chain = Vec::new();
        let mut cursor = self.caused_by.as_deref();
        while let Some(cause) = cursor {
            if !cause.reason.is_empty() {
                chain.push(cause.reason.as_str());
            }
            cursor = cause.caused_by.as_deref();
        }
        let mut message = format!("{}: {}", self.error_type, self.reason);
        if !chain.is_empty() {
            chain.reverse();
            message.push_str(&format!(" ({})", chain.join(" -> ")));
        }
        message
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardFailure {
    pub shard: Option<i64>,
    pub index: Option<String>,
    pub reason: Option<ErrorCause>,
}

/// A failed backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendFailure {
    /// HTTP status, when the backend answered at all.
    pub status: Option<u16>,

    /// Structured error.
    pub error: ErrorCause,

    /// True when the client-side deadline elapsed.
    #[serde(default)]
    pub client_timeout: bool,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Structured(ErrorCause),
    Plain(String),
}

impl BackendFailure {
    pub fn new(status: Option<u16>, error: ErrorCause) -> Self {
        BackendFailure {
            status,
            error,
            client_timeout: false,
        }
    }

    /// Build a failure from an HTTP error response.
    pub fn from_body(status: u16, body: &str) -> Self {
        let error = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(ErrorEnvelope {
                error: ErrorBody::Structured(cause),
            }) => cause,
            Ok(ErrorEnvelope {
                error: ErrorBody::Plain(reason),
            }) => ErrorCause::new("unknown", reason),
            Err(_) => {
                let mut parts = vec![format!("Status code {status}")];
                let snippet: String = body.chars().take(200).collect();
                if !snippet.is_empty() {
                    parts.push(snippet);
                }
                ErrorCause::new("unknown", parts.join("; "))
            }
        };
        BackendFailure::new(Some(status), error)
    }

    /// The backend could not be reached.
    pub fn transport(reason: impl Into<String>) -> Self {
        BackendFailure::new(None, ErrorCause::new("http_exception", reason))
    }

    /// The client-side deadline elapsed.
    pub fn client_timeout(reason: impl Into<String>) -> Self {
        BackendFailure {
            status: None,
            error: ErrorCause::new("client_timeout", reason),
            client_timeout: true,
        }
    }

    /// The cause used for classification: the first root cause when the
    /// backend reported any, the top-level error otherwise.
    pub fn primary_cause(&self) -> &ErrorCause {
        self.error.root_cause.first().unwrap_or(&self.error)
    }

    pub fn has_root_cause(&self) -> bool {
        !self.error.root_cause.is_empty()
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{status}] {}", self.error.format_message()),
            None => write!(f, "{}", self.error.format_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "took": 12,
            "timed_out": false,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "max_score": 3.5,
                "hits": [
                    {"_index": "wiki_content", "_id": "1", "_score": 3.5,
                     "_source": {"namespace": 0, "title": "Foo", "redirect": [{"namespace": 0, "title": "Fu"}]},
                     "highlight": {"title": ["<span class=\"searchmatch\">Foo</span>"]}}
                ]
            },
            "suggest": {"suggest": [{"text": "fo", "offset": 0, "length": 2,
                "options": [{"text": "foo", "highlighted": "<em>foo</em>", "score": 0.5}]}]}
        }"#;
        let response: RawResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.took, 12);
        assert_eq!(response.hits.total.value(), 2);
        assert_eq!(response.hit_count(), 1);
        assert_eq!(response.hits.hits[0].source.redirect[0].title, "Fu");
        assert_eq!(response.suggest["suggest"][0].options[0].text, "foo");
    }

    #[test]
    fn test_plain_total_count() {
        let response: RawResponse =
            serde_json::from_str(r#"{"hits": {"total": 7, "hits": []}}"#).unwrap();
        assert_eq!(response.hits.total.value(), 7);
    }

    #[test]
    fn test_failure_from_structured_body() {
        let body = r#"{"error": {"root_cause": [{"type": "query_shard_exception", "reason": "bad"}],
            "type": "search_phase_execution_exception", "reason": "all shards failed"}, "status": 400}"#;
        let failure = BackendFailure::from_body(400, body);
        assert!(failure.has_root_cause());
        assert_eq!(failure.primary_cause().error_type, "query_shard_exception");
    }

    #[test]
    fn test_failure_from_unstructured_body() {
        let failure = BackendFailure::from_body(503, "no healthy upstream");
        assert_eq!(failure.primary_cause().error_type, "unknown");
        assert_eq!(failure.primary_cause().reason, "Status code 503; no healthy upstream");
    }

    #[test]
    fn test_format_message_chain() {
        let cause = ErrorCause::new("a", "top").with_caused_by(
            ErrorCause::new("b", "middle").with_caused_by(ErrorCause::new("c", "bottom")),
        );
        assert_eq!(cause.format_message(), "a: top (bottom -> middle)");
    }
}
