//! Assembly of the backend request from a parsed query.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::SearchConfig;
use crate::namespace::{NS_FILE, NamespaceRegistry};
use crate::query::assembled::{
    AssembledQuery, BoostFunction, Filter, HighlightSpec, IndexSelector, PhraseRescore,
    SuggestSpec, TextQuery,
};
use crate::query::boost::BoostSpec;
use crate::query::clause::{Clause, Keyword};
use crate::query::escaper::term_count;
use crate::query::parsed::{ParsedQuery, RawQuery, SortMode};
use crate::results::ResultsType;

/// Builds [`AssembledQuery`] values. Holds only read-only references, so one
/// builder can serve any number of requests.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    config: &'a SearchConfig,
    registry: &'a NamespaceRegistry,
}

/// Scoring clauses, filters and exclusions derived from extracted clauses.
#[derive(Debug, Default)]
struct ClauseQueries {
    musts: Vec<TextQuery>,
    filters: Vec<Filter>,
    exclusions: Vec<Filter>,
    phrase_texts: Vec<String>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(config: &'a SearchConfig, registry: &'a NamespaceRegistry) -> Self {
        QueryBuilder { config, registry }
    }

    fn weighted_fields(&self, namespaces: &BTreeSet<i32>) -> Vec<(&'static str, f64)> {
        let w = &self.config.weights;
        let mut fields = vec![
            ("title", w.title),
            ("redirect.title", w.redirect),
            ("category", w.category),
            ("heading", w.heading),
            ("opening_text", w.opening_text),
            ("text", w.text),
            ("auxiliary_text", w.auxiliary_text),
        ];
        if namespaces.is_empty() || namespaces.contains(&NS_FILE) {
            fields.push(("file_text", w.file_text));
        }
        fields
    }

    /// Every searched field twice: the unstemmed copy at full weight and the
    /// stemmed copy scaled by the stemmed weight.
    pub fn fields(&self, namespaces: &BTreeSet<i32>) -> Vec<String> {
        let stemmed = self.config.weights.stemmed_weight;
        self.weighted_fields(namespaces)
            .into_iter()
            .flat_map(|(name, weight)| {
                [
                    format!("{name}.plain^{weight}"),
                    format!("{name}^{}", weight * stemmed),
                ]
            })
            .collect()
    }

    fn exact_fields(&self, namespaces: &BTreeSet<i32>) -> Vec<String> {
        self.weighted_fields(namespaces)
            .into_iter()
            .map(|(name, weight)| format!("{name}.plain^{weight}"))
            .collect()
    }

    fn stemmed_fields(&self, namespaces: &BTreeSet<i32>) -> Vec<String> {
        self.weighted_fields(namespaces)
            .into_iter()
            .map(|(name, weight)| format!("{name}^{weight}"))
            .collect()
    }

    /// Target indices and, when needed, the namespace filter.
    ///
    /// The filter is left out when every namespace is searched, or when the
    /// requested namespaces are exactly the ones held by the single index
    /// they map to.
    pub fn index_selector(&self, raw: &RawQuery) -> (IndexSelector, Option<Filter>) {
        let base = &self.config.backend.index_base_name;
        if raw.namespaces.is_empty() {
            return (IndexSelector::new([base.clone()]), None);
        }
        let filter = Filter::Namespaces {
            ids: raw.namespaces.iter().copied().collect(),
        };
        let suffixes: BTreeSet<&str> = raw
            .namespaces
            .iter()
            .map(|id| self.registry.index_suffix(*id))
            .collect();
        match suffixes.into_iter().collect::<Vec<_>>().as_slice() {
            [suffix] => {
                let index = IndexSelector::new([format!("{base}_{suffix}")]);
                if self.registry.namespaces_in_index(suffix) == raw.namespaces {
                    (index, None)
                } else {
                    (index, Some(filter))
                }
            }
            _ => (IndexSelector::new([base.clone()]), Some(filter)),
        }
    }

    fn phrase_query(&self, text: &str, slop: Option<u32>, fuzzy: bool, ns: &BTreeSet<i32>) -> TextQuery {
        let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
        let proximity = slop.map(|s| format!("~{s}")).unwrap_or_default();
        TextQuery::QueryString {
            query: format!("\"{escaped}\"{proximity}"),
            fields: if fuzzy {
                self.stemmed_fields(ns)
            } else {
                self.exact_fields(ns)
            },
            phrase_slop: self.config.phrase.slop,
        }
    }

    fn clause_filter(&self, clause: &Clause, ns: &BTreeSet<i32>) -> Option<Filter> {
        let filter = match clause {
            Clause::Phrase { text, slop, fuzzy } => Filter::Text {
                query: self.phrase_query(text, *slop, *fuzzy, ns),
            },
            Clause::WildcardTerm { term } => Filter::Text {
                query: TextQuery::QueryString {
                    query: term.clone(),
                    fields: self.exact_fields(ns),
                    phrase_slop: self.config.phrase.slop,
                },
            },
            Clause::PrefixFilter { prefix, namespace } => Filter::TitlePrefix {
                prefix: prefix.clone(),
                namespace: *namespace,
            },
            Clause::CategoryFilter { category } => Filter::Category {
                name: category.clone(),
            },
            Clause::KeywordFilter { keyword, value } => match keyword {
                Keyword::HasTemplate => Filter::Template { name: value.clone() },
                Keyword::LinksTo => Filter::LinksTo { title: value.clone() },
                Keyword::InTitle => Filter::Title { text: value.clone() },
                Keyword::InSource => Filter::Source { text: value.clone() },
                Keyword::InCategory => Filter::Category { name: value.clone() },
                Keyword::BoostTemplates => return None,
            },
            Clause::RegexSourceFilter {
                pattern,
                case_sensitive,
            } => Filter::Regex {
                pattern: pattern.clone(),
                case_sensitive: *case_sensitive,
                max_determinized_states: self.config.regex.max_determinized_states,
                language: self.config.language.corpus_language.clone(),
            },
            Clause::NotFilter(_)
            | Clause::TemplateBoostDirective { .. }
            | Clause::RecencyDirective { .. }
            | Clause::LocalityDirective => return None,
        };
        Some(filter)
    }

    fn clause_queries(&self, parsed: &ParsedQuery, ns: &BTreeSet<i32>) -> ClauseQueries {
        let mut out = ClauseQueries::default();
        for clause in &parsed.clauses {
            match clause {
                Clause::NotFilter(inner) => out.exclusions.extend(self.clause_filter(inner, ns)),
                Clause::Phrase { text, .. } => {
                    out.phrase_texts.push(text.clone());
                    if let Some(Filter::Text { query }) = self.clause_filter(clause, ns) {
                        out.musts.push(query);
                    }
                }
                Clause::WildcardTerm { .. } => {
                    if let Some(Filter::Text { query }) = self.clause_filter(clause, ns) {
                        out.musts.push(query);
                    }
                }
                other => out.filters.extend(self.clause_filter(other, ns)),
            }
        }
        out
    }

    fn rescore(&self, parsed: &ParsedQuery, raw: &RawQuery) -> Option<PhraseRescore> {
        let phrase = &self.config.phrase;
        let eligible = raw.sort == SortMode::Relevance
            && phrase.rescore_boost > 1.0
            && !parsed.fuzzy
            && !parsed.skip_suggest
            && !parsed.special_syntax
            && !parsed.has_phrase_or_wildcard()
            && term_count(&parsed.text) > 1;
        if !eligible {
            return None;
        }
        Some(PhraseRescore {
            window_size: phrase.rescore_window_size,
            query: TextQuery::QueryString {
                query: format!("\"{}\"", parsed.residual),
                fields: self.fields(&raw.namespaces),
                phrase_slop: phrase.rescore_slop,
            },
            boost: phrase.rescore_boost,
        })
    }

    fn boost_functions(&self, boosts: &BoostSpec, now: DateTime<Utc>) -> Vec<BoostFunction> {
        let mut functions = Vec::new();
        if self.config.boosts.incoming_links {
            functions.push(BoostFunction::IncomingLinks);
        }
        if let Some(recency) = boosts.recency {
            functions.push(BoostFunction::Recency {
                recency,
                now_ms: now.timestamp_millis(),
            });
        }
        functions.extend(boosts.templates.iter().map(|(name, weight)| BoostFunction::Template {
            name: name.clone(),
            weight: *weight,
        }));
        functions.extend(
            boosts
                .namespace_groups()
                .into_iter()
                .map(|(weight, ids)| BoostFunction::Namespaces { ids, weight }),
        );
        functions.extend(boosts.languages.iter().map(|(language, weight)| {
            BoostFunction::Language {
                language: language.clone(),
                weight: *weight,
            }
        }));
        functions
    }

    fn suggest(&self, parsed: &ParsedQuery, raw: &RawQuery) -> Option<SuggestSpec> {
        let suggest = &self.config.suggest;
        let eligible = suggest.enabled
            && raw.offset == 0
            && raw.results_type == ResultsType::FullText
            && !parsed.skip_suggest
            && parsed.has_text();
        eligible.then(|| SuggestSpec {
            text: parsed.text.clone(),
            confidence: suggest.confidence,
            max_errors: suggest.max_errors,
            use_text: suggest.use_text,
        })
    }

    /// Everything shared by the rich and the degraded query.
    fn skeleton(&self, parsed: &ParsedQuery, raw: &RawQuery, clauses: &ClauseQueries) -> AssembledQuery {
        let (index, namespace_filter) = self.index_selector(raw);
        let mut filters: Vec<Filter> = namespace_filter.into_iter().collect();
        filters.extend(clauses.filters.iter().cloned());

        let max = self.config.max_offset;
        let from = raw.offset.min(max);
        let size = (raw.limit > 0).then(|| raw.limit.min(max - from));
        let op_class = parsed.op_class();

        AssembledQuery {
            main: None,
            musts: Vec::new(),
            filters,
            exclusions: clauses.exclusions.clone(),
            rescore: None,
            boosts: Vec::new(),
            suggest: None,
            highlight: (raw.results_type == ResultsType::FullText).then(|| HighlightSpec {
                source_regex: parsed.uses_regex(),
            }),
            source: raw.results_type.source_fields(),
            sort: raw.sort,
            from,
            size,
            index,
            op_class,
            shard_timeout: self.config.timeouts.shard(op_class).to_string(),
            client_timeout: self.config.timeouts.client(op_class),
            dfs: self.config.more_accurate_scoring,
            degraded: false,
        }
    }

    /// Build the full query: weighted match, phrase rescore, boosts and
    /// suggestion.
    pub fn build(
        &self,
        parsed: &ParsedQuery,
        raw: &RawQuery,
        boosts: &BoostSpec,
        now: DateTime<Utc>,
    ) -> AssembledQuery {
        let clauses = self.clause_queries(parsed, &raw.namespaces);
        let mut query = self.skeleton(parsed, raw, &clauses);

        query.main = parsed.has_text().then(|| TextQuery::QueryString {
            query: parsed.residual.clone(),
            fields: self.fields(&raw.namespaces),
            phrase_slop: self.config.phrase.slop,
        });
        query.musts = clauses.musts;
        query.rescore = self.rescore(parsed, raw);
        if raw.sort == SortMode::Relevance {
            query.boosts = self.boost_functions(boosts, now);
        }
        query.suggest = self.suggest(parsed, raw);

        debug!(
            index = %query.index.path(),
            op_class = query.op_class.as_str(),
            rescore = query.rescore.is_some(),
            boosts = query.boosts.len(),
            "Assembled query"
        );
        query
    }

    /// Build the fallback used after the backend failed to parse the full
    /// query: the free text and phrase words as a plain AND of terms, the
    /// same filters, nothing else. `None` when there are no words to search.
    pub fn build_degraded(&self, parsed: &ParsedQuery, raw: &RawQuery) -> Option<AssembledQuery> {
        let clauses = self.clause_queries(parsed, &raw.namespaces);
        let terms = std::iter::once(parsed.text.as_str())
            .chain(clauses.phrase_texts.iter().map(String::as_str))
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        if terms.is_empty() {
            return None;
        }

        let mut query = self.skeleton(parsed, raw, &clauses);
        query
            .exclusions
            .retain(|filter| !matches!(filter, Filter::Text { .. }));
        query.main = Some(TextQuery::Simple {
            query: terms,
            fields: self.fields(&raw.namespaces),
        });
        query.degraded = true;
        Some(query)
    }
}
