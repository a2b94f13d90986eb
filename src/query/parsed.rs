//! Request input and the parsed form of a query.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SearchlineError;
use crate::executor::pool::OpClass;
use crate::query::clause::Clause;
use crate::results::ResultsType;

/// Result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Relevance with rescoring.
    #[default]
    Relevance,
    /// Relevance without rescoring.
    JustMatch,
    /// Index order.
    None,
    LastEditAsc,
    LastEditDesc,
    CreateTimestampAsc,
    CreateTimestampDesc,
    IncomingLinksAsc,
    IncomingLinksDesc,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Relevance => "relevance",
            SortMode::JustMatch => "just_match",
            SortMode::None => "none",
            SortMode::LastEditAsc => "last_edit_asc",
            SortMode::LastEditDesc => "last_edit_desc",
            SortMode::CreateTimestampAsc => "create_timestamp_asc",
            SortMode::CreateTimestampDesc => "create_timestamp_desc",
            SortMode::IncomingLinksAsc => "incoming_links_asc",
            SortMode::IncomingLinksDesc => "incoming_links_desc",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = SearchlineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            SortMode::Relevance,
            SortMode::JustMatch,
            SortMode::None,
            SortMode::LastEditAsc,
            SortMode::LastEditDesc,
            SortMode::CreateTimestampAsc,
            SortMode::CreateTimestampDesc,
            SortMode::IncomingLinksAsc,
            SortMode::IncomingLinksDesc,
        ]
        .into_iter()
        .find(|mode| mode.as_str() == s)
        .ok_or_else(|| SearchlineError::invalid_argument(format!("unknown sort mode '{s}'")))
    }
}

/// A search request as received from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawQuery {
    pub text: String,

    /// Namespaces to search. Empty means every namespace.
    pub namespaces: BTreeSet<i32>,

    pub offset: usize,

    /// Number of results wanted. 0 leaves the size to the backend.
    pub limit: usize,

    pub sort: SortMode,

    pub results_type: ResultsType,

    /// Language of the requester, for the language boost.
    pub user_language: Option<String>,
}

impl RawQuery {
    pub fn new(text: impl Into<String>) -> Self {
        RawQuery {
            text: text.into(),
            namespaces: BTreeSet::new(),
            offset: 0,
            limit: 20,
            sort: SortMode::default(),
            results_type: ResultsType::default(),
            user_language: None,
        }
    }

    pub fn with_namespaces<I: IntoIterator<Item = i32>>(mut self, namespaces: I) -> Self {
        self.namespaces = namespaces.into_iter().collect();
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_results_type(mut self, results_type: ResultsType) -> Self {
        self.results_type = results_type;
        self
    }

    pub fn with_user_language(mut self, language: impl Into<String>) -> Self {
        self.user_language = Some(language.into());
        self
    }
}

/// Where a consumed span is re-attached in a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Prefix,
    Suffix,
}

/// A span of the raw query consumed by extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumedSpan {
    pub text: String,
    pub placement: Placement,
}

/// The interpreted query. Built once by the extractor and never changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedQuery {
    /// Free text left after extraction, before escaping.
    pub text: String,

    /// Escaped free text, safe to hand to the backend parser.
    pub residual: String,

    /// Clauses in extraction order.
    pub clauses: Vec<Clause>,

    /// Spans consumed by extraction, in order.
    pub consumed: Vec<ConsumedSpan>,

    /// The query used syntax beyond plain words.
    pub special_syntax: bool,

    /// The free text asks for fuzzy matching.
    pub fuzzy: bool,

    /// Suggestions would not be meaningful for this query.
    pub skip_suggest: bool,
}

impl ParsedQuery {
    /// Nothing to search for: no free text and no clauses.
    pub fn is_empty(&self) -> bool {
        self.residual.trim().is_empty() && self.clauses.is_empty()
    }

    pub fn has_text(&self) -> bool {
        !self.residual.trim().is_empty()
    }

    /// Quoted phrases or wildcard terms were extracted.
    pub fn has_phrase_or_wildcard(&self) -> bool {
        self.clauses.iter().any(|clause| {
            let inner = match clause {
                Clause::NotFilter(inner) => inner.as_ref(),
                other => other,
            };
            matches!(inner, Clause::Phrase { .. } | Clause::WildcardTerm { .. })
        })
    }

    pub fn uses_regex(&self) -> bool {
        self.clauses.iter().any(Clause::uses_regex)
    }

    pub fn uses_prefix(&self) -> bool {
        self.clauses
            .iter()
            .any(|clause| matches!(clause, Clause::PrefixFilter { .. }))
    }

    pub fn is_local(&self) -> bool {
        self.clauses.contains(&Clause::LocalityDirective)
    }

    /// Admission pool this query runs in.
    pub fn op_class(&self) -> OpClass {
        if self.uses_regex() {
            OpClass::Regex
        } else if self.uses_prefix() {
            OpClass::Prefix
        } else {
            OpClass::Search
        }
    }

    /// Re-attach consumed syntax around a suggested text.
    pub fn decorate_suggestion(&self, suggested: &str) -> String {
        let spans = |placement: Placement| {
            self.consumed
                .iter()
                .filter(move |span| span.placement == placement)
                .map(|span| span.text.as_str())
        };
        spans(Placement::Prefix)
            .chain(std::iter::once(suggested))
            .chain(spans(Placement::Suffix))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(clauses: Vec<Clause>, consumed: Vec<ConsumedSpan>) -> ParsedQuery {
        ParsedQuery {
            text: "foo".to_string(),
            residual: "foo".to_string(),
            clauses,
            consumed,
            special_syntax: false,
            fuzzy: false,
            skip_suggest: false,
        }
    }

    #[test]
    fn test_sort_mode_parse() {
        assert_eq!("relevance".parse::<SortMode>().unwrap(), SortMode::Relevance);
        assert_eq!(
            "incoming_links_desc".parse::<SortMode>().unwrap(),
            SortMode::IncomingLinksDesc
        );
        assert!("random".parse::<SortMode>().is_err());
    }

    #[test]
    fn test_op_class_selection() {
        let regex = Clause::RegexSourceFilter {
            pattern: "a".to_string(),
            case_sensitive: true,
        };
        let prefix = Clause::PrefixFilter {
            prefix: "Foo".to_string(),
            namespace: None,
        };
        assert_eq!(parsed(vec![], vec![]).op_class(), OpClass::Search);
        assert_eq!(parsed(vec![prefix.clone()], vec![]).op_class(), OpClass::Prefix);
        assert_eq!(parsed(vec![prefix, regex.negate()], vec![]).op_class(), OpClass::Regex);
    }

    #[test]
    fn test_decorate_suggestion() {
        let query = parsed(
            vec![],
            vec![
                ConsumedSpan {
                    text: "prefix:Bar".to_string(),
                    placement: Placement::Suffix,
                },
                ConsumedSpan {
                    text: "incategory:Foo".to_string(),
                    placement: Placement::Prefix,
                },
            ],
        );
        assert_eq!(query.decorate_suggestion("fixed"), "incategory:Foo fixed prefix:Bar");
    }
}
