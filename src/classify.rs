//! Classification of failed backend calls.
//!
//! A failure is mapped to an [`ErrorClass`] by walking an ordered table of
//! heuristics. Each rule matches either the structured error type or the
//! human readable reason of the first root cause. The table is plain data
//! ([`ClassifierRule`]) and can be replaced from the configuration file when
//! the backend changes its error vocabulary.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::BackendFailure;
use crate::error::{FailureKind, Result, SearchFailure, keys};

lazy_static! {
    static ref REGEX_POSITION_RE: Regex =
        Regex::new(r"(?:[a-z_]+: )?(.+) at position (\d+)").unwrap();
}

/// Broad category of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    ParseError,
    RegexTooComplex,
    #[serde(rename = "regex_syntax")]
    RegexSyntaxError,
    Rejected,
    #[serde(rename = "transient")]
    TransientFailure,
    ConfigIssue,
    MemoryIssue,
    Unknown,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::ParseError => "parse_error",
            ErrorClass::RegexTooComplex => "regex_too_complex",
            ErrorClass::RegexSyntaxError => "regex_syntax",
            ErrorClass::Rejected => "rejected",
            ErrorClass::TransientFailure => "transient",
            ErrorClass::ConfigIssue => "config_issue",
            ErrorClass::MemoryIssue => "memory_issue",
            ErrorClass::Unknown => "unknown",
        }
    }

    /// Only a parse error is worth one more attempt with a simpler query.
    pub fn allows_degraded_retry(&self) -> bool {
        matches!(self, ErrorClass::ParseError)
    }
}

/// One row of the heuristic table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRule {
    pub class: ErrorClass,

    /// Patterns tried against the error type.
    #[serde(default)]
    pub type_patterns: Vec<String>,

    /// Patterns tried against the error reason.
    #[serde(default)]
    pub message_patterns: Vec<String>,
}

impl ClassifierRule {
    pub fn new(class: ErrorClass, type_patterns: &[&str], message_patterns: &[&str]) -> Self {
        ClassifierRule {
            class,
            type_patterns: type_patterns.iter().map(|p| p.to_string()).collect(),
            message_patterns: message_patterns.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Compile the patterns of this rule.
    pub fn compile(&self) -> Result<CompiledRule> {
        Ok(CompiledRule {
            class: self.class,
            types: join_patterns(&self.type_patterns)?,
            messages: join_patterns(&self.message_patterns)?,
        })
    }
}

fn join_patterns(patterns: &[String]) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    Ok(Some(Regex::new(&patterns.join("|"))?))
}

/// A rule ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    class: ErrorClass,
    types: Option<Regex>,
    messages: Option<Regex>,
}

impl CompiledRule {
    fn matches(&self, error_type: &str, reason: &str) -> bool {
        self.types.as_ref().is_some_and(|re| re.is_match(error_type))
            || self.messages.as_ref().is_some_and(|re| re.is_match(reason))
    }
}

/// The built-in heuristic table, most specific first.
pub fn default_rules() -> Vec<ClassifierRule> {
    vec![
        ClassifierRule::new(ErrorClass::RegexSyntaxError, &["(^|_)regex_"], &[]),
        ClassifierRule::new(
            ErrorClass::RegexTooComplex,
            &["^too_complex_to_determinize_exception$"],
            &[],
        ),
        ClassifierRule::new(
            ErrorClass::ParseError,
            &[
                "^query_shard_exception$",
                "^parsing_exception$",
                "^parse_exception$",
                "^search_parse_exception$",
                "^query_parsing_exception$",
            ],
            &[],
        ),
        ClassifierRule::new(
            ErrorClass::Rejected,
            &[
                "^elasticsearch_parse_exception$",
                "^illegal_argument_exception$",
                "^too_many_clauses$",
                "^script_exception$",
            ],
            &[],
        ),
        ClassifierRule::new(ErrorClass::MemoryIssue, &["^circuit_breaking_exception$"], &[]),
        ClassifierRule::new(
            ErrorClass::ConfigIssue,
            &["^index_not_found_exception$"],
            &["index_not_found_exception"],
        ),
        ClassifierRule::new(
            ErrorClass::TransientFailure,
            &[
                "^es_rejected_execution_exception$",
                "^search_phase_execution_exception",
                "^remote_transport_exception$",
                "^search_context_missing_exception$",
                "^elasticsearch_timeout_exception$",
                "^http_exception$",
            ],
            &[
                "^Connection refused",
                "^No enabled connection",
                "^Status code 503",
                r"^upstream connect error or disconnect/reset",
                "^upstream request timeout",
                "shard failure during the fetch phase",
            ],
        ),
    ]
}

/// Maps backend failures to error classes and user-facing failures.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CompiledRule>,
}

impl Classifier {
    pub fn new(rules: &[ClassifierRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(ClassifierRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Classifier { rules })
    }

    /// Classify a failure using the first root cause, or the top-level
    /// error when no root cause was reported.
    pub fn classify(&self, failure: &BackendFailure) -> ErrorClass {
        let cause = failure.primary_cause();
        self.rules
            .iter()
            .find(|rule| rule.matches(&cause.error_type, &cause.reason))
            .map(|rule| rule.class)
            .unwrap_or(ErrorClass::Unknown)
    }

    /// Turn a classified failure into a typed search failure with a stable
    /// message key and a diagnostic extracted from the cause chain.
    pub fn explain(&self, failure: &BackendFailure, class: ErrorClass) -> SearchFailure {
        let cause = failure.primary_cause();
        match class {
            ErrorClass::ParseError => SearchFailure::new(
                FailureKind::ParseError,
                keys::PARSE_ERROR,
                format!("Parse error on {}", parse_error_message(failure)),
                Some(class),
            ),
            ErrorClass::RegexTooComplex => SearchFailure::new(
                FailureKind::RegexTooComplex {
                    detail: cause.reason.clone(),
                },
                keys::REGEX_TOO_COMPLEX,
                cause.reason.clone(),
                Some(class),
            ),
            ErrorClass::RegexSyntaxError => {
                let (message, position) = regex_syntax_details(&cause.reason);
                SearchFailure::new(
                    FailureKind::RegexSyntax { message, position },
                    keys::REGEX_SYNTAX,
                    format!("Regex syntax error: {}", cause.reason),
                    Some(class),
                )
            }
            ErrorClass::Rejected | ErrorClass::ConfigIssue | ErrorClass::MemoryIssue => {
                SearchFailure::new(
                    FailureKind::BackendRefused,
                    keys::BACKEND_REFUSED,
                    refusal_message(failure),
                    Some(class),
                )
            }
            ErrorClass::TransientFailure | ErrorClass::Unknown => SearchFailure::new(
                FailureKind::BackendError,
                keys::BACKEND_ERROR,
                cause.format_message(),
                Some(class),
            ),
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier {
            rules: default_rules()
                .iter()
                .filter_map(|rule| rule.compile().ok())
                .collect(),
        }
    }
}

/// The useful part of a parse error is buried in the first shard failure
/// and ends at the first newline.
fn parse_error_message(failure: &BackendFailure) -> String {
    let message = match failure.error.failed_shards.first().and_then(|s| s.reason.as_ref()) {
        Some(reason) => match reason.caused_by.as_deref() {
            Some(caused_by) => caused_by.reason.as_str(),
            None => reason.reason.as_str(),
        },
        None if failure.has_root_cause() => failure.primary_cause().reason.as_str(),
        None => "???",
    };
    message.lines().next().unwrap_or_default().to_string()
}

/// Split a regex syntax error into a message and a position. Both fall back
/// to `unknown`.
fn regex_syntax_details(reason: &str) -> (String, String) {
    if let Some(caps) = REGEX_POSITION_RE.captures(reason) {
        return (caps[1].to_string(), caps[2].to_string());
    }
    let message = if reason == "unexpected end-of-string" {
        "regex too short to be correct"
    } else {
        "unknown"
    };
    (message.to_string(), "unknown".to_string())
}

fn refusal_message(failure: &BackendFailure) -> String {
    let cause = failure.primary_cause();
    if cause.error_type == "script_exception" && !cause.script_stack.is_empty() {
        let base = match failure.error.caused_by.as_deref() {
            Some(caused_by) => caused_by.format_message(),
            None => cause.format_message(),
        };
        return format!("{base}\n\t{}\n", cause.script_stack.join("\n\t"));
    }
    cause.format_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ErrorCause;

    fn failure_with_root(error_type: &str, reason: &str) -> BackendFailure {
        BackendFailure::new(
            Some(400),
            ErrorCause::new("search_phase_execution_exception", "all shards failed")
                .with_root_cause(ErrorCause::new(error_type, reason)),
        )
    }

    #[test]
    fn test_classify_by_root_cause_type() {
        let classifier = Classifier::default();
        let cases = [
            ("query_shard_exception", ErrorClass::ParseError),
            ("parsing_exception", ErrorClass::ParseError),
            ("invalid_regex_exception", ErrorClass::RegexSyntaxError),
            ("too_complex_to_determinize_exception", ErrorClass::RegexTooComplex),
            ("too_many_clauses", ErrorClass::Rejected),
            ("circuit_breaking_exception", ErrorClass::MemoryIssue),
            ("index_not_found_exception", ErrorClass::ConfigIssue),
            ("es_rejected_execution_exception", ErrorClass::TransientFailure),
            ("something_new_exception", ErrorClass::Unknown),
        ];
        for (error_type, expected) in cases {
            assert_eq!(
                classifier.classify(&failure_with_root(error_type, "x")),
                expected,
                "type {error_type}"
            );
        }
    }

    #[test]
    fn test_classify_by_message() {
        let classifier = Classifier::default();
        let failure = BackendFailure::from_body(503, "upstream connect error or disconnect/reset before headers");
        assert_eq!(classifier.classify(&failure), ErrorClass::TransientFailure);

        let failure = BackendFailure::new(None, ErrorCause::new("unknown", "Connection refused (os error 111)"));
        assert_eq!(classifier.classify(&failure), ErrorClass::TransientFailure);

        let failure = BackendFailure::new(
            None,
            ErrorCause::new("bulk", "failed: index_not_found_exception somewhere"),
        );
        assert_eq!(classifier.classify(&failure), ErrorClass::ConfigIssue);
    }

    #[test]
    fn test_transport_failure_is_transient() {
        let classifier = Classifier::default();
        let failure = BackendFailure::transport("error sending request");
        assert_eq!(classifier.classify(&failure), ErrorClass::TransientFailure);
    }

    #[test]
    fn test_explain_parse_error_uses_first_shard_cause() {
        let classifier = Classifier::default();
        let error = ErrorCause::new("search_phase_execution_exception", "all shards failed")
            .with_root_cause(ErrorCause::new("query_shard_exception", "Failed to parse query"))
            .with_failed_shard(
                ErrorCause::new("query_shard_exception", "Failed to parse query").with_caused_by(
                    ErrorCause::new("parse_exception", "Cannot parse 'foo AND': EOF\nmore detail"),
                ),
            );
        let failure = BackendFailure::new(Some(400), error);
        let class = classifier.classify(&failure);
        assert_eq!(class, ErrorClass::ParseError);
        assert!(class.allows_degraded_retry());

        let explained = classifier.explain(&failure, class);
        assert_eq!(explained.kind, FailureKind::ParseError);
        assert_eq!(explained.message_key, keys::PARSE_ERROR);
        assert_eq!(explained.diagnostic, "Parse error on Cannot parse 'foo AND': EOF");
    }

    #[test]
    fn test_explain_regex_syntax_error() {
        let classifier = Classifier::default();
        let failure =
            failure_with_root("invalid_regex_exception", "invalid_regex_exception: expected ']' at position 2");
        let explained = classifier.explain(&failure, ErrorClass::RegexSyntaxError);
        assert_eq!(
            explained.kind,
            FailureKind::RegexSyntax {
                message: "expected ']'".to_string(),
                position: "2".to_string(),
            }
        );

        let failure = failure_with_root("invalid_regex_exception", "unexpected end-of-string");
        let explained = classifier.explain(&failure, ErrorClass::RegexSyntaxError);
        assert_eq!(
            explained.kind,
            FailureKind::RegexSyntax {
                message: "regex too short to be correct".to_string(),
                position: "unknown".to_string(),
            }
        );
    }

    #[test]
    fn test_explain_too_complex_and_refused() {
        let classifier = Classifier::default();
        let failure = failure_with_root(
            "too_complex_to_determinize_exception",
            "Determinizing [^]]*alt would result in more than 20000 states",
        );
        let explained = classifier.explain(&failure, ErrorClass::RegexTooComplex);
        assert_eq!(explained.message_key, keys::REGEX_TOO_COMPLEX);
        assert!(matches!(explained.kind, FailureKind::RegexTooComplex { .. }));

        let failure = failure_with_root("too_many_clauses", "maxClauseCount is set to 1024");
        let explained = classifier.explain(&failure, ErrorClass::Rejected);
        assert_eq!(explained.kind, FailureKind::BackendRefused);
        assert_eq!(explained.diagnostic, "too_many_clauses: maxClauseCount is set to 1024");
    }

    #[test]
    fn test_rules_round_trip_through_json() {
        let json = serde_json::to_string(&default_rules()).unwrap();
        let rules: Vec<ClassifierRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(rules, default_rules());
        assert!(json.contains("\"regex_syntax\""));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let rule = ClassifierRule::new(ErrorClass::Unknown, &["("], &[]);
        assert!(rule.compile().is_err());
    }
}
