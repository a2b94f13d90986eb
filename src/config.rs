//! Configuration for query interpretation and execution.
//!
//! Every section carries `#[serde(default)]`, so a JSON file only needs to
//! name the values it overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::{ClassifierRule, default_rules};
use crate::error::{Result, SearchlineError};
use crate::executor::pool::OpClass;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Backend connection settings.
    pub backend: BackendConfig,

    /// Per-field weights of the primary match.
    pub weights: FieldWeights,

    /// Phrase slop and phrase rescore settings.
    pub phrase: PhraseConfig,

    /// Recency decay defaults.
    pub recency: RecencyConfig,

    /// Namespace registry, index routing and namespace weights.
    pub namespaces: NamespaceConfig,

    /// Language boost settings.
    pub language: LanguageConfig,

    /// Boosts that have no settings of their own.
    pub boosts: BoostConfig,

    /// Default boost templates, one or more `Name|NNN%` entries per line.
    /// `#` starts a comment.
    pub boost_templates: String,

    /// "Did you mean" suggestion settings.
    pub suggest: SuggestConfig,

    /// Regex search settings.
    pub regex: RegexConfig,

    /// Admission pool sizes.
    pub pools: PoolConfig,

    /// Client-side and shard timeouts.
    pub timeouts: TimeoutConfig,

    /// Ordered error classification heuristics.
    pub classifier: Vec<ClassifierRule>,

    /// Deepest result offset a request may page to.
    pub max_offset: usize,

    /// Ask the backend for distributed term statistics.
    pub more_accurate_scoring: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            weights: FieldWeights::default(),
            phrase: PhraseConfig::default(),
            recency: RecencyConfig::default(),
            namespaces: NamespaceConfig::default(),
            language: LanguageConfig::default(),
            boosts: BoostConfig::default(),
            boost_templates: String::new(),
            suggest: SuggestConfig::default(),
            regex: RegexConfig::default(),
            pools: PoolConfig::default(),
            timeouts: TimeoutConfig::default(),
            classifier: default_rules(),
            max_offset: 10_000,
            more_accurate_scoring: false,
        }
    }
}

impl SearchConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: SearchConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise produce nonsense queries.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.recency.default_decay_portion)
            || !(0.0..=1.0).contains(&self.recency.unspecified_decay_portion)
        {
            return Err(SearchlineError::config(
                "recency decay portions must be within 0..=1",
            ));
        }
        if self.recency.default_half_life_days < 0.0 {
            return Err(SearchlineError::config("recency half life must not be negative"));
        }
        for op in OpClass::ALL {
            if self.pools.permits(op) == 0 {
                return Err(SearchlineError::config(format!(
                    "admission pool '{}' must allow at least one request",
                    op.as_str()
                )));
            }
        }
        if self.max_offset == 0 {
            return Err(SearchlineError::config("max_offset must be positive"));
        }
        for rule in &self.classifier {
            rule.compile()?;
        }
        Ok(())
    }
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the search cluster.
    pub base_url: String,

    /// Base name of the indices; per-namespace indices are `<base>_<suffix>`.
    pub index_base_name: String,

    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9200".to_string(),
            index_base_name: "wiki".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Weight of each searchable field relative to body text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub title: f64,
    pub redirect: f64,
    pub category: f64,
    pub heading: f64,
    pub opening_text: f64,
    pub text: f64,
    pub auxiliary_text: f64,
    pub file_text: f64,

    /// Weight of the stemmed copy of a field relative to its unstemmed copy.
    pub stemmed_weight: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title: 20.0,
            redirect: 15.0,
            category: 8.0,
            heading: 5.0,
            opening_text: 3.0,
            text: 1.0,
            auxiliary_text: 0.5,
            file_text: 0.5,
            stemmed_weight: 0.5,
        }
    }
}

/// Phrase handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseConfig {
    /// Slop of phrases in the primary query.
    pub slop: u32,

    /// Slop of the rescore phrase.
    pub rescore_slop: u32,

    /// Multiplier applied to the rescore phrase score. Values <= 1 disable
    /// the rescore.
    pub rescore_boost: f64,

    /// Number of top hits per shard that are rescored.
    pub rescore_window_size: u32,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            slop: 0,
            rescore_slop: 1,
            rescore_boost: 10.0,
            rescore_window_size: 512,
        }
    }
}

/// Toggles for boosts without other settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    /// Boost pages by the number of incoming links.
    pub incoming_links: bool,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            incoming_links: true,
        }
    }
}

/// Recency decay defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyConfig {
    /// Decay portion applied to every query. 0 disables decay unless the
    /// query asks for it.
    pub default_decay_portion: f64,

    /// Decay portion used when `prefer-recent:` gives none.
    pub unspecified_decay_portion: f64,

    /// Half life in days used when `prefer-recent:` gives none.
    pub default_half_life_days: f64,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            default_decay_portion: 0.0,
            unspecified_decay_portion: 0.6,
            default_half_life_days: 160.0,
        }
    }
}

/// A namespace known to the corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceDef {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl NamespaceDef {
    pub fn new(id: i32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            aliases: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }
}

/// Namespace registry, routing and weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Known namespaces.
    pub registry: Vec<NamespaceDef>,

    /// Namespaces stored in the content index. Everything else is stored in
    /// the general index.
    pub content_namespaces: Vec<i32>,

    /// Explicit weights by namespace id.
    pub weights: BTreeMap<i32, f64>,

    /// Weight of subject namespaces without an explicit weight.
    pub default_weight: f64,

    /// Weight of a talk namespace relative to its subject namespace.
    pub talk_weight: f64,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        let registry = vec![
            NamespaceDef::new(-2, "Media"),
            NamespaceDef::new(-1, "Special"),
            NamespaceDef::new(0, ""),
            NamespaceDef::new(1, "Talk"),
            NamespaceDef::new(2, "User"),
            NamespaceDef::new(3, "User talk"),
            NamespaceDef::new(4, "Project"),
            NamespaceDef::new(5, "Project talk"),
            NamespaceDef::new(6, "File").with_alias("Image"),
            NamespaceDef::new(7, "File talk").with_alias("Image talk"),
            NamespaceDef::new(8, "MediaWiki"),
            NamespaceDef::new(9, "MediaWiki talk"),
            NamespaceDef::new(10, "Template"),
            NamespaceDef::new(11, "Template talk"),
            NamespaceDef::new(12, "Help"),
            NamespaceDef::new(13, "Help talk"),
            NamespaceDef::new(14, "Category"),
            NamespaceDef::new(15, "Category talk"),
        ];
        let weights = BTreeMap::from([(2, 0.05), (4, 0.1), (8, 0.05), (10, 0.005), (12, 0.1)]);
        Self {
            registry,
            content_namespaces: vec![0],
            weights,
            default_weight: 0.2,
            talk_weight: 0.25,
        }
    }
}

/// Language boost weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Language code of the corpus.
    pub corpus_language: String,

    /// Weight given to documents in the requester's language. 0 disables.
    pub user_weight: f64,

    /// Weight given to documents in the corpus language when it differs
    /// from the requester's. 0 disables.
    pub corpus_weight: f64,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            corpus_language: "en".to_string(),
            user_weight: 0.0,
            corpus_weight: 0.0,
        }
    }
}

/// Phrase suggester settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    pub enabled: bool,
    pub confidence: f64,
    pub max_errors: f64,

    /// Also suggest from body text, after titles and redirects.
    pub use_text: bool,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            confidence: 2.0,
            max_errors: 2.0,
            use_text: false,
        }
    }
}

/// Regex search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexConfig {
    /// Whether `insource:/.../` is honored at all.
    pub enabled: bool,

    /// Largest automaton the backend may build for one regex.
    pub max_determinized_states: u32,
}

impl Default for RegexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_determinized_states: 20_000,
        }
    }
}

/// Admission pool sizes per operation class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub search: usize,
    pub regex: usize,
    pub prefix: usize,

    /// How long a request may wait for a slot before it is turned away.
    pub admission_wait: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            search: num_cpus::get().max(4) * 8,
            regex: 4,
            prefix: 16,
            admission_wait: Duration::from_millis(200),
        }
    }
}

impl PoolConfig {
    pub fn permits(&self, op: OpClass) -> usize {
        match op {
            OpClass::Search => self.search,
            OpClass::Regex => self.regex,
            OpClass::Prefix => self.prefix,
        }
    }
}

/// Timeouts per operation class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long the caller waits for a search response.
    pub client_search: Duration,
    pub client_regex: Duration,

    /// How long the backend waits for slow shards, in backend time syntax.
    pub shard_search: String,
    pub shard_regex: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            client_search: Duration::from_secs(40),
            client_regex: Duration::from_secs(240),
            shard_search: "20s".to_string(),
            shard_regex: "120s".to_string(),
        }
    }
}

impl TimeoutConfig {
    pub fn client(&self, op: OpClass) -> Duration {
        match op {
            OpClass::Regex => self.client_regex,
            OpClass::Search | OpClass::Prefix => self.client_search,
        }
    }

    pub fn shard(&self, op: OpClass) -> &str {
        match op {
            OpClass::Regex => &self.shard_regex,
            OpClass::Search | OpClass::Prefix => &self.shard_search,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.weights.title, 20.0);
        assert_eq!(config.phrase.rescore_window_size, 512);
        assert_eq!(config.recency.default_half_life_days, 160.0);
        assert_eq!(config.max_offset, 10_000);
        assert!(config.pools.search > 0);
        assert!(!config.classifier.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_overrides_only_named_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"weights": {{"title": 40}}, "regex": {{"enabled": false}}, "pools": {{"regex": 1}}}}"#
        )
        .unwrap();

        let config = SearchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.weights.title, 40.0);
        assert_eq!(config.weights.redirect, 15.0);
        assert!(!config.regex.enabled);
        assert_eq!(config.pools.regex, 1);
        assert_eq!(config.pools.prefix, 16);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SearchConfig::default();
        config.recency.unspecified_decay_portion = 1.5;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.pools.regex = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_by_op_class() {
        let timeouts = TimeoutConfig::default();
        assert_eq!(timeouts.client(OpClass::Regex), Duration::from_secs(240));
        assert_eq!(timeouts.client(OpClass::Prefix), Duration::from_secs(40));
        assert_eq!(timeouts.shard(OpClass::Search), "20s");
    }
}
