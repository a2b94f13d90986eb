//! Result transformation: raw hits into titled, highlighted result entities.

pub mod highlight;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::{RawHit, RawResponse};
use crate::namespace::NamespaceRegistry;
use crate::query::assembled::{
    HIGHLIGHT_POST, HIGHLIGHT_PRE, SUGGEST_GROUPS, SUGGEST_POST, SUGGEST_PRE,
};
use crate::query::parsed::ParsedQuery;

use highlight::{escape_snippet, find_redirect, fragment, strip_markers};

/// Shape of the results a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultsType {
    /// Titles with snippets, sizes and scores.
    #[default]
    FullText,
    /// Titles only.
    Titles,
    /// Document ids only.
    Ids,
}

impl ResultsType {
    /// Stored fields to fetch. `None` fetches no source at all.
    pub fn source_fields(&self) -> Option<Vec<String>> {
        let fields: &[&str] = match self {
            ResultsType::FullText => &[
                "namespace",
                "namespace_text",
                "title",
                "redirect.*",
                "text_bytes",
                "word_count",
                "timestamp",
            ],
            ResultsType::Titles => &["namespace", "title"],
            ResultsType::Ids => return None,
        };
        Some(fields.iter().map(|f| f.to_string()).collect())
    }
}

/// A page title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleRef {
    pub namespace: i32,
    pub text: String,
    /// `Namespace:Text`, or just the text in the main namespace.
    pub prefixed: String,
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntity {
    pub title: TitleRef,
    pub title_snippet: String,
    /// The redirect that matched, when the match came through a redirect.
    pub redirect_title: Option<TitleRef>,
    pub redirect_snippet: String,
    /// Heading text of the matching section.
    pub section_title: Option<String>,
    /// Fragment anchor of the matching section.
    pub section_anchor: Option<String>,
    pub section_snippet: String,
    pub text_snippet: String,
    pub word_count: u64,
    pub byte_size: u64,
    /// Score relative to the best hit, 0..=1.
    pub score: f64,
    pub timestamp: Option<String>,
    /// Index name of a hit from another corpus.
    pub interwiki: Option<String>,
}

/// A "did you mean" suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionEntity {
    /// Replacement query text.
    pub text: String,
    /// The same text with corrected words highlighted, HTML-escaped.
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullTextResults {
    pub results: Vec<ResultEntity>,
    pub suggestion: Option<SuggestionEntity>,
    pub total_hits: u64,
    pub took_ms: u64,
}

/// Transformed results, shaped by [`ResultsType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchOutput {
    FullText(FullTextResults),
    Titles { titles: Vec<TitleRef>, total_hits: u64 },
    Ids { ids: Vec<String>, total_hits: u64 },
}

impl SearchOutput {
    /// No results, for queries that never reached the backend.
    pub fn empty(results_type: ResultsType) -> Self {
        match results_type {
            ResultsType::FullText => SearchOutput::FullText(FullTextResults {
                results: Vec::new(),
                suggestion: None,
                total_hits: 0,
                took_ms: 0,
            }),
            ResultsType::Titles => SearchOutput::Titles {
                titles: Vec::new(),
                total_hits: 0,
            },
            ResultsType::Ids => SearchOutput::Ids {
                ids: Vec::new(),
                total_hits: 0,
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SearchOutput::FullText(full) => full.results.len(),
            SearchOutput::Titles { titles, .. } => titles.len(),
            SearchOutput::Ids { ids, .. } => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_hits(&self) -> u64 {
        match self {
            SearchOutput::FullText(full) => full.total_hits,
            SearchOutput::Titles { total_hits, .. } | SearchOutput::Ids { total_hits, .. } => {
                *total_hits
            }
        }
    }
}

/// Converts raw responses into [`SearchOutput`].
#[derive(Debug, Clone, Copy)]
pub struct ResultTransformer<'a> {
    registry: &'a NamespaceRegistry,
    index_base_name: &'a str,
}

impl<'a> ResultTransformer<'a> {
    pub fn new(registry: &'a NamespaceRegistry, index_base_name: &'a str) -> Self {
        ResultTransformer {
            registry,
            index_base_name,
        }
    }

    pub fn transform(
        &self,
        response: &RawResponse,
        results_type: ResultsType,
        parsed: &ParsedQuery,
    ) -> SearchOutput {
        let total_hits = response.hits.total.value();
        let hits = &response.hits.hits;
        match results_type {
            ResultsType::Ids => SearchOutput::Ids {
                ids: hits.iter().map(|hit| hit.id.clone()).collect(),
                total_hits,
            },
            ResultsType::Titles => SearchOutput::Titles {
                titles: hits
                    .iter()
                    .map(|hit| self.title_ref(hit.source.namespace, &hit.source.title))
                    .collect(),
                total_hits,
            },
            ResultsType::FullText => {
                let max_score = response.hits.max_score.unwrap_or_else(|| {
                    hits.iter()
                        .filter_map(|hit| hit.score)
                        .fold(0.0, f64::max)
                });
                SearchOutput::FullText(FullTextResults {
                    results: hits.iter().map(|hit| self.entity(hit, max_score)).collect(),
                    suggestion: self.suggestion(response, parsed),
                    total_hits,
                    took_ms: response.took,
                })
            }
        }
    }

    fn title_ref(&self, namespace: i32, text: &str) -> TitleRef {
        TitleRef {
            namespace,
            text: text.to_string(),
            prefixed: self.registry.prefixed_text(namespace, text),
        }
    }

    fn entity(&self, hit: &RawHit, max_score: f64) -> ResultEntity {
        let source = &hit.source;
        let snippet = |fragment: &str| escape_snippet(fragment, HIGHLIGHT_PRE, HIGHLIGHT_POST);

        let mut title_snippet = String::new();
        let mut redirect_snippet = String::new();
        let mut redirect_title = None;
        if let Some(title) = fragment(hit, "title") {
            title_snippet = snippet(title);
        } else if let Some(redirect) = fragment(hit, "redirect.title") {
            match find_redirect(redirect, &source.redirect, HIGHLIGHT_PRE, HIGHLIGHT_POST) {
                Some(found) => {
                    redirect_snippet = snippet(redirect);
                    redirect_title = Some(self.title_ref(found.namespace, &found.title));
                }
                None => warn!(
                    index = %hit.index,
                    id = %hit.id,
                    title = %source.title,
                    "Highlighted redirect matches none of the stored redirects"
                ),
            }
        }

        let (section_title, section_anchor, section_snippet) = match fragment(hit, "heading") {
            Some(heading) => {
                let title = strip_markers(heading, HIGHLIGHT_PRE, HIGHLIGHT_POST);
                let anchor = title.replace(' ', "_");
                (Some(title), Some(anchor), snippet(heading))
            }
            None => (None, None, String::new()),
        };

        let text_snippet = fragment(hit, "text")
            .or_else(|| fragment(hit, "source_text"))
            .map(snippet)
            .unwrap_or_default();

        let score = match hit.score {
            Some(score) if max_score > 0.0 => score / max_score,
            _ => 0.0,
        };

        ResultEntity {
            title: self.title_ref(source.namespace, &source.title),
            title_snippet,
            redirect_title,
            redirect_snippet,
            section_title,
            section_anchor,
            section_snippet,
            text_snippet,
            word_count: source.word_count.unwrap_or_default(),
            byte_size: source.text_bytes.unwrap_or_default(),
            score,
            timestamp: source.timestamp.clone(),
            interwiki: self.interwiki(&hit.index),
        }
    }

    fn interwiki(&self, index: &str) -> Option<String> {
        let base = self.index_base_name;
        let local = index.is_empty()
            || index == base
            || index
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('_'));
        (!local).then(|| index.to_string())
    }

    /// The first option of the first non-empty suggestion group, with the
    /// consumed query syntax put back around it.
    fn suggestion(&self, response: &RawResponse, parsed: &ParsedQuery) -> Option<SuggestionEntity> {
        let option = SUGGEST_GROUPS.iter().find_map(|group| {
            response
                .suggest
                .get(*group)
                .and_then(|entries| entries.first())
                .and_then(|entry| entry.options.first())
        })?;
        let highlighted = option.highlighted.as_deref().unwrap_or(&option.text);
        Some(SuggestionEntity {
            text: parsed.decorate_suggestion(&option.text),
            snippet: parsed.decorate_suggestion(&escape_snippet(
                highlighted,
                SUGGEST_PRE,
                SUGGEST_POST,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::backend::{HitSource, RedirectRef, SuggestEntry, SuggestOption, TotalHits};
    use crate::config::NamespaceConfig;
    use crate::query::parsed::{ConsumedSpan, Placement};

    fn marked(text: &str) -> String {
        format!("{HIGHLIGHT_PRE}{text}{HIGHLIGHT_POST}")
    }

    fn parsed(consumed: Vec<ConsumedSpan>) -> ParsedQuery {
        ParsedQuery {
            text: "speling".to_string(),
            residual: "speling".to_string(),
            clauses: Vec::new(),
            consumed,
            special_syntax: false,
            fuzzy: false,
            skip_suggest: false,
        }
    }

    fn hit(title: &str, score: f64, highlight: &[(&str, String)]) -> RawHit {
        RawHit {
            index: "wiki_content".to_string(),
            id: "1".to_string(),
            score: Some(score),
            source: HitSource {
                namespace: 0,
                title: title.to_string(),
                redirect: vec![
                    RedirectRef {
                        namespace: 2,
                        title: "Fu".to_string(),
                    },
                    RedirectRef {
                        namespace: 0,
                        title: "Fu".to_string(),
                    },
                ],
                text_bytes: Some(1234),
                word_count: Some(200),
                ..Default::default()
            },
            highlight: highlight
                .iter()
                .map(|(k, v)| (k.to_string(), vec![v.clone()]))
                .collect(),
        }
    }

    fn response(hits: Vec<RawHit>) -> RawResponse {
        let mut response = RawResponse::default();
        response.hits.total = TotalHits::Count(hits.len() as u64);
        response.hits.hits = hits;
        response.took = 7;
        response
    }

    fn full_text(output: SearchOutput) -> FullTextResults {
        match output {
            SearchOutput::FullText(full) => full,
            other => panic!("expected full text results, got {other:?}"),
        }
    }

    fn transform(response: &RawResponse, parsed: &ParsedQuery) -> FullTextResults {
        let registry = NamespaceRegistry::new(&NamespaceConfig::default());
        let transformer = ResultTransformer::new(&registry, "wiki");
        full_text(transformer.transform(response, ResultsType::FullText, parsed))
    }

    #[test]
    fn test_title_snippet_wins_over_redirect() {
        let raw = response(vec![hit(
            "Foo",
            2.0,
            &[("title", marked("Foo")), ("redirect.title", marked("Fu"))],
        )]);
        let results = transform(&raw, &parsed(vec![]));
        let entity = &results.results[0];
        assert_eq!(entity.title_snippet, marked("Foo"));
        assert_eq!(entity.redirect_snippet, "");
        assert!(entity.redirect_title.is_none());
        assert_eq!(entity.word_count, 200);
        assert_eq!(entity.byte_size, 1234);
        assert_eq!(results.took_ms, 7);
    }

    #[test]
    fn test_redirect_resolution() {
        let raw = response(vec![hit("Foo", 2.0, &[("redirect.title.plain", marked("Fu"))])]);
        let entity = &transform(&raw, &parsed(vec![])).results[0];
        assert_eq!(entity.title_snippet, "");
        assert_eq!(entity.redirect_snippet, marked("Fu"));
        assert_eq!(entity.redirect_title.as_ref().map(|t| t.namespace), Some(0));
    }

    #[test]
    fn test_unmatched_redirect_is_dropped() {
        let raw = response(vec![hit("Foo", 2.0, &[("redirect.title", marked("Nope"))])]);
        let entity = &transform(&raw, &parsed(vec![])).results[0];
        assert!(entity.redirect_title.is_none());
        assert_eq!(entity.redirect_snippet, "");
    }

    #[test]
    fn test_sections_text_and_scores() {
        let raw = response(vec![
            hit(
                "Foo",
                4.0,
                &[
                    ("heading", format!("Early {}", marked("life"))),
                    ("text", format!("a < b {}", marked("foo"))),
                ],
            ),
            hit("Bar", 1.0, &[]),
        ]);
        let results = transform(&raw, &parsed(vec![]));
        let first = &results.results[0];
        assert_eq!(first.section_title.as_deref(), Some("Early life"));
        assert_eq!(first.section_anchor.as_deref(), Some("Early_life"));
        assert_eq!(first.text_snippet, format!("a &lt; b {}", marked("foo")));
        assert_eq!(first.score, 1.0);
        assert_eq!(results.results[1].score, 0.25);
        assert_eq!(results.results[1].text_snippet, "");
    }

    #[test]
    fn test_interwiki_tag() {
        let mut foreign = hit("Foo", 1.0, &[]);
        foreign.index = "otherwiki_content".to_string();
        let raw = response(vec![foreign, hit("Bar", 1.0, &[])]);
        let results = transform(&raw, &parsed(vec![]));
        assert_eq!(results.results[0].interwiki.as_deref(), Some("otherwiki_content"));
        assert!(results.results[1].interwiki.is_none());
    }

    #[test]
    fn test_suggestion_priority_and_decoration() {
        let mut raw = response(vec![]);
        let entry = |text: &str| {
            vec![SuggestEntry {
                text: "speling".to_string(),
                offset: 0,
                length: 7,
                options: vec![SuggestOption {
                    text: text.to_string(),
                    highlighted: Some(format!("<em>{text}</em>")),
                    score: 0.1,
                }],
            }]
        };
        raw.suggest = BTreeMap::from([
            ("redirect_suggest".to_string(), entry("spieling")),
            ("title_suggest".to_string(), entry("spelling")),
        ]);
        let consumed = vec![ConsumedSpan {
            text: "prefer-recent:".to_string(),
            placement: Placement::Prefix,
        }];
        let suggestion = transform(&raw, &parsed(consumed)).suggestion.unwrap();
        assert_eq!(suggestion.text, "prefer-recent: spelling");
        assert_eq!(suggestion.snippet, "prefer-recent: <em>spelling</em>");
    }

    #[test]
    fn test_empty_suggestion_groups_are_skipped() {
        let mut raw = response(vec![]);
        raw.suggest = BTreeMap::from([(
            "title_suggest".to_string(),
            vec![SuggestEntry::default()],
        )]);
        assert!(transform(&raw, &parsed(vec![])).suggestion.is_none());
    }

    #[test]
    fn test_titles_and_ids_shapes() {
        let registry = NamespaceRegistry::new(&NamespaceConfig::default());
        let transformer = ResultTransformer::new(&registry, "wiki");
        let mut help = hit("Contents", 1.0, &[]);
        help.source.namespace = 12;
        let raw = response(vec![help]);

        match transformer.transform(&raw, ResultsType::Titles, &parsed(vec![])) {
            SearchOutput::Titles { titles, total_hits } => {
                assert_eq!(titles[0].prefixed, "Help:Contents");
                assert_eq!(total_hits, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        match transformer.transform(&raw, ResultsType::Ids, &parsed(vec![])) {
            SearchOutput::Ids { ids, .. } => assert_eq!(ids, vec!["1".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_source_fields() {
        assert!(ResultsType::Ids.source_fields().is_none());
        assert_eq!(
            ResultsType::Titles.source_fields(),
            Some(vec!["namespace".to_string(), "title".to_string()])
        );
    }
}
