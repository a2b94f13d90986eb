//! The structured request handed to the backend, and its JSON rendering.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::executor::pool::OpClass;
use crate::query::boost::Recency;
use crate::query::parsed::SortMode;

/// Highlight markers around matched terms in body snippets.
pub const HIGHLIGHT_PRE: &str = "<span class=\"searchmatch\">";
pub const HIGHLIGHT_POST: &str = "</span>";

/// Highlight markers around corrected terms in suggestions.
pub const SUGGEST_PRE: &str = "<em>";
pub const SUGGEST_POST: &str = "</em>";

/// Suggestion groups, in the order they are consulted.
pub const SUGGEST_GROUPS: [&str; 3] = ["title_suggest", "redirect_suggest", "text_suggest"];

/// A full-text query over a set of weighted fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TextQuery {
    /// The backend's full query-string syntax.
    QueryString {
        query: String,
        fields: Vec<String>,
        phrase_slop: u32,
    },
    /// A restricted syntax that only understands AND and OR.
    Simple { query: String, fields: Vec<String> },
}

impl TextQuery {
    pub fn to_json(&self) -> Value {
        match self {
            TextQuery::QueryString {
                query,
                fields,
                phrase_slop,
            } => json!({
                "query_string": {
                    "query": query,
                    "fields": fields,
                    "default_operator": "AND",
                    "phrase_slop": phrase_slop,
                    "fuzzy_prefix_length": 2,
                    "allow_leading_wildcard": false,
                    "rewrite": "top_terms_boost_1024",
                }
            }),
            TextQuery::Simple { query, fields } => json!({
                "simple_query_string": {
                    "query": query,
                    "fields": fields,
                    "default_operator": "AND",
                    "flags": "OR|AND",
                }
            }),
        }
    }
}

/// A non-scoring restriction on matching documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    Namespaces { ids: Vec<i32> },
    Category { name: String },
    Template { name: String },
    LinksTo { title: String },
    Title { text: String },
    Source { text: String },
    TitlePrefix { prefix: String, namespace: Option<i32> },
    Regex {
        pattern: String,
        case_sensitive: bool,
        max_determinized_states: u32,
        language: String,
    },
    /// A phrase or wildcard that must not match.
    Text { query: TextQuery },
}

impl Filter {
    pub fn to_json(&self) -> Value {
        match self {
            Filter::Namespaces { ids } => json!({ "terms": { "namespace": ids } }),
            Filter::Category { name } => json!({ "match": { "category.lowercase_keyword": name } }),
            Filter::Template { name } => json!({ "match": { "template": name } }),
            Filter::LinksTo { title } => json!({ "match": { "outgoing_link": title } }),
            Filter::Title { text } => json!({
                "multi_match": {
                    "query": text,
                    "fields": ["title", "title.plain", "redirect.title", "redirect.title.plain"],
                    "operator": "AND",
                }
            }),
            Filter::Source { text } => json!({
                "match": { "source_text": { "query": text, "operator": "AND" } }
            }),
            Filter::TitlePrefix { prefix, namespace } => {
                let prefix_match = json!({ "match": { "title.prefix": prefix } });
                match namespace {
                    Some(ns) => json!({
                        "bool": { "must": [prefix_match, { "term": { "namespace": ns } }] }
                    }),
                    None => prefix_match,
                }
            }
            Filter::Regex {
                pattern,
                case_sensitive,
                max_determinized_states,
                language,
            } => json!({
                "source_regex": {
                    "regex": pattern,
                    "field": "source_text",
                    "ngram_field": "source_text.trigram",
                    "max_expand": 10,
                    "max_states_traced": 10_000,
                    "max_determinized_states": max_determinized_states,
                    "max_ngrams_extracted": 100,
                    "case_sensitive": case_sensitive,
                    "locale": language,
                }
            }),
            Filter::Text { query } => query.to_json(),
        }
    }
}

/// A function-score boost.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BoostFunction {
    /// `log10(incoming_links + 2)`.
    IncomingLinks,
    /// Exponential decay by last edit time.
    Recency { recency: Recency, now_ms: i64 },
    Template { name: String, weight: f64 },
    Namespaces { ids: Vec<i32>, weight: f64 },
    Language { language: String, weight: f64 },
}

impl BoostFunction {
    pub fn to_json(&self) -> Value {
        match self {
            BoostFunction::IncomingLinks => json!({
                "field_value_factor": {
                    "field": "incoming_links",
                    "modifier": "log2p",
                    "missing": 0,
                }
            }),
            BoostFunction::Recency { recency, now_ms } => json!({
                "script_score": {
                    "script": {
                        "source": "Math.expm1(params.decayConstant * (doc['timestamp'].value.toInstant().toEpochMilli() - params.now)) * params.decayPortion + 1",
                        "lang": "painless",
                        "params": {
                            "decayConstant": recency.decay_constant(),
                            "decayPortion": recency.decay_portion,
                            "now": now_ms,
                        }
                    }
                }
            }),
            BoostFunction::Template { name, weight } => json!({
                "filter": { "match": { "template": name } },
                "weight": weight,
            }),
            BoostFunction::Namespaces { ids, weight } => json!({
                "filter": { "terms": { "namespace": ids } },
                "weight": weight,
            }),
            BoostFunction::Language { language, weight } => json!({
                "filter": { "match": { "language": language } },
                "weight": weight,
            }),
        }
    }
}

/// Second-pass phrase rescore.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhraseRescore {
    pub window_size: u32,
    pub query: TextQuery,
    pub boost: f64,
}

/// "Did you mean" request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestSpec {
    pub text: String,
    pub confidence: f64,
    pub max_errors: f64,
    pub use_text: bool,
}

impl SuggestSpec {
    fn suggester(&self, field: &str) -> Value {
        json!({
            "phrase": {
                "field": field,
                "size": 1,
                "max_errors": self.max_errors,
                "confidence": self.confidence,
                "real_word_error_likelihood": 0.95,
                "direct_generator": [{
                    "field": field,
                    "suggest_mode": "always",
                    "max_term_freq": 0.5,
                    "min_doc_freq": 0.0,
                    "prefix_length": 2,
                }],
                "highlight": { "pre_tag": SUGGEST_PRE, "post_tag": SUGGEST_POST },
                "smoothing": { "stupid_backoff": { "discount": 0.4 } },
            }
        })
    }

    pub fn to_json(&self) -> Value {
        let mut suggest = Map::new();
        suggest.insert("text".to_string(), json!(self.text));
        suggest.insert(SUGGEST_GROUPS[0].to_string(), self.suggester("title.suggest"));
        suggest.insert(SUGGEST_GROUPS[1].to_string(), self.suggester("redirect.title.suggest"));
        if self.use_text {
            suggest.insert(SUGGEST_GROUPS[2].to_string(), self.suggester("text.suggest"));
        }
        Value::Object(suggest)
    }
}

/// Which highlighted fields to request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighlightSpec {
    /// Add a highlight of regex matches in the source text.
    pub source_regex: bool,
}

impl HighlightSpec {
    pub fn to_json(&self) -> Value {
        let title = json!({ "type": "fvh", "number_of_fragments": 0 });
        let redirect = json!({ "type": "fvh", "number_of_fragments": 1, "fragment_size": 10000, "order": "score" });
        let heading = json!({ "type": "fvh", "number_of_fragments": 1, "fragment_size": 10000, "order": "score" });
        let text = json!({ "type": "fvh", "number_of_fragments": 1, "fragment_size": 150, "no_match_size": 150 });
        let plain = |base: &Value| {
            let mut v = base.clone();
            v["type"] = json!("unified");
            v
        };

        let mut fields = Map::new();
        for (name, spec) in [
            ("title", &title),
            ("redirect.title", &redirect),
            ("heading", &heading),
            ("text", &text),
        ] {
            fields.insert(name.to_string(), spec.clone());
            fields.insert(format!("{name}.plain"), plain(spec));
        }
        if self.source_regex {
            fields.insert(
                "source_text.plain".to_string(),
                json!({ "type": "unified", "number_of_fragments": 1, "fragment_size": 150 }),
            );
        }
        json!({
            "pre_tags": [HIGHLIGHT_PRE],
            "post_tags": [HIGHLIGHT_POST],
            "fields": fields,
        })
    }
}

/// Target indices of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexSelector {
    pub indices: Vec<String>,
}

impl IndexSelector {
    pub fn new<I, S>(indices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndexSelector {
            indices: indices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn path(&self) -> String {
        self.indices.join(",")
    }
}

/// Everything needed to run one search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledQuery {
    /// Query over the free text.
    pub main: Option<TextQuery>,
    /// Additional scoring clauses that must match.
    pub musts: Vec<TextQuery>,
    pub filters: Vec<Filter>,
    pub exclusions: Vec<Filter>,
    pub rescore: Option<PhraseRescore>,
    pub boosts: Vec<BoostFunction>,
    pub suggest: Option<SuggestSpec>,
    pub highlight: Option<HighlightSpec>,
    /// Stored fields to return. `None` returns no source.
    pub source: Option<Vec<String>>,
    pub sort: SortMode,
    pub from: usize,
    pub size: Option<usize>,
    pub index: IndexSelector,
    pub op_class: OpClass,
    pub shard_timeout: String,
    pub client_timeout: Duration,
    pub dfs: bool,
    /// Built by the degraded fallback.
    pub degraded: bool,
}

impl AssembledQuery {
    fn query_json(&self) -> Value {
        let mut must: Vec<Value> = self.main.iter().map(TextQuery::to_json).collect();
        must.extend(self.musts.iter().map(TextQuery::to_json));
        if must.is_empty() {
            must.push(json!({ "match_all": {} }));
        }

        let mut bool_query = Map::new();
        bool_query.insert("must".to_string(), Value::Array(must));
        if !self.filters.is_empty() {
            bool_query.insert(
                "filter".to_string(),
                Value::Array(self.filters.iter().map(Filter::to_json).collect()),
            );
        }
        if !self.exclusions.is_empty() {
            bool_query.insert(
                "must_not".to_string(),
                Value::Array(self.exclusions.iter().map(Filter::to_json).collect()),
            );
        }
        let query = json!({ "bool": bool_query });

        if self.boosts.is_empty() {
            return query;
        }
        json!({
            "function_score": {
                "query": query,
                "functions": self.boosts.iter().map(BoostFunction::to_json).collect::<Vec<_>>(),
                "score_mode": "multiply",
                "boost_mode": "multiply",
            }
        })
    }

    fn sort_json(&self) -> Option<Value> {
        let field = |name: &str, order: &str| {
            let mut clause = Map::new();
            clause.insert(name.to_string(), json!(order));
            Some(json!([clause]))
        };
        match self.sort {
            SortMode::Relevance | SortMode::JustMatch => None,
            SortMode::None => Some(json!(["_doc"])),
            SortMode::LastEditAsc => field("timestamp", "asc"),
            SortMode::LastEditDesc => field("timestamp", "desc"),
            SortMode::CreateTimestampAsc => field("create_timestamp", "asc"),
            SortMode::CreateTimestampDesc => field("create_timestamp", "desc"),
            SortMode::IncomingLinksAsc => Some(json!([{
                "incoming_links": { "order": "asc", "missing": "_first" }
            }])),
            SortMode::IncomingLinksDesc => Some(json!([{
                "incoming_links": { "order": "desc", "missing": "_last" }
            }])),
        }
    }

    /// Request body.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("query".to_string(), self.query_json());
        body.insert(
            "_source".to_string(),
            match &self.source {
                Some(fields) => json!(fields),
                None => json!(false),
            },
        );
        if let Some(highlight) = &self.highlight {
            body.insert("highlight".to_string(), highlight.to_json());
        }
        if let Some(suggest) = &self.suggest {
            body.insert("suggest".to_string(), suggest.to_json());
        }
        if let Some(rescore) = &self.rescore {
            body.insert(
                "rescore".to_string(),
                json!([{
                    "window_size": rescore.window_size,
                    "query": {
                        "rescore_query": rescore.query.to_json(),
                        "query_weight": 1.0,
                        "rescore_query_weight": rescore.boost,
                    }
                }]),
            );
        }
        if let Some(sort) = self.sort_json() {
            body.insert("sort".to_string(), sort);
        }
        if self.from > 0 {
            body.insert("from".to_string(), json!(self.from));
        }
        if let Some(size) = self.size {
            body.insert("size".to_string(), json!(size));
        }
        body.insert("stats".to_string(), json!([self.op_class.as_str()]));
        Value::Object(body)
    }

    /// URL parameters.
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("timeout".to_string(), self.shard_timeout.clone())];
        if self.dfs {
            params.push(("search_type".to_string(), "dfs_query_then_fetch".to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> AssembledQuery {
        AssembledQuery {
            main: Some(TextQuery::QueryString {
                query: "foo".to_string(),
                fields: vec!["title.plain^20".to_string()],
                phrase_slop: 0,
            }),
            musts: Vec::new(),
            filters: Vec::new(),
            exclusions: Vec::new(),
            rescore: None,
            boosts: Vec::new(),
            suggest: None,
            highlight: None,
            source: None,
            sort: SortMode::Relevance,
            from: 0,
            size: Some(20),
            index: IndexSelector::new(["wiki_content"]),
            op_class: OpClass::Search,
            shard_timeout: "20s".to_string(),
            client_timeout: Duration::from_secs(40),
            dfs: false,
            degraded: false,
        }
    }

    #[test]
    fn test_plain_body() {
        let body = query().to_body();
        assert_eq!(body["query"]["bool"]["must"][0]["query_string"]["query"], "foo");
        assert_eq!(body["_source"], json!(false));
        assert_eq!(body["size"], 20);
        assert!(body.get("from").is_none());
        assert!(body["query"].get("function_score").is_none());
    }

    #[test]
    fn test_boosts_wrap_in_function_score() {
        let mut q = query();
        q.boosts.push(BoostFunction::IncomingLinks);
        q.filters.push(Filter::Category {
            name: "Films".to_string(),
        });
        let body = q.to_body();
        let function_score = &body["query"]["function_score"];
        assert_eq!(function_score["functions"][0]["field_value_factor"]["modifier"], "log2p");
        assert_eq!(
            function_score["query"]["bool"]["filter"][0]["match"]["category.lowercase_keyword"],
            "Films"
        );
    }

    #[test]
    fn test_empty_must_becomes_match_all() {
        let mut q = query();
        q.main = None;
        let body = q.to_body();
        assert!(body["query"]["bool"]["must"][0].get("match_all").is_some());
    }

    #[test]
    fn test_suggest_and_highlight_markers() {
        let mut q = query();
        q.suggest = Some(SuggestSpec {
            text: "foo".to_string(),
            confidence: 2.0,
            max_errors: 2.0,
            use_text: false,
        });
        q.highlight = Some(HighlightSpec { source_regex: true });
        let body = q.to_body();

        let title = &body["suggest"]["title_suggest"]["phrase"];
        assert_eq!(title["size"], 1);
        assert_eq!(title["highlight"]["pre_tag"], SUGGEST_PRE);
        assert_eq!(title["direct_generator"][0]["suggest_mode"], "always");
        assert!(body["suggest"].get("text_suggest").is_none());

        assert_eq!(body["highlight"]["pre_tags"][0], HIGHLIGHT_PRE);
        assert!(body["highlight"]["fields"].get("source_text.plain").is_some());
        assert!(body["highlight"]["fields"].get("text.plain").is_some());
    }

    #[test]
    fn test_params_and_sort() {
        let mut q = query();
        q.dfs = true;
        q.sort = SortMode::LastEditDesc;
        assert_eq!(
            q.params(),
            vec![
                ("timeout".to_string(), "20s".to_string()),
                ("search_type".to_string(), "dfs_query_then_fetch".to_string()),
            ]
        );
        assert_eq!(q.to_body()["sort"], json!([{ "timestamp": "desc" }]));
    }

    #[test]
    fn test_index_path() {
        assert_eq!(
            IndexSelector::new(["wiki_content", "wiki_general"]).path(),
            "wiki_content,wiki_general"
        );
    }
}
