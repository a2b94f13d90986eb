//! Boost inputs: template weights, namespace weights, recency and language.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::config::SearchConfig;
use crate::namespace::{NS_TALK, NamespaceRegistry};
use crate::query::clause::Clause;
use crate::query::parsed::{ParsedQuery, RawQuery};

lazy_static! {
    static ref TEMPLATE_BOOST_RE: Regex = Regex::new(r"([^|]+)\|([0-9]+)% ?").unwrap();
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Parse `Name|NNN%` entries into `(name, weight)` pairs. Text after `#` on
/// a line is ignored.
pub fn parse_templates(text: &str) -> Vec<(String, f64)> {
    let mut templates = Vec::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default();
        for caps in TEMPLATE_BOOST_RE.captures_iter(line) {
            let name = caps[1].trim();
            if name.is_empty() {
                continue;
            }
            if let Ok(percent) = caps[2].parse::<u32>() {
                templates.push((name.to_string(), f64::from(percent) / 100.0));
            }
        }
    }
    templates
}

/// Exponential decay of scores by page age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Recency {
    /// Share of the score subject to decay, 0..=1.
    pub decay_portion: f64,
    pub half_life_days: f64,
}

impl Recency {
    /// `None` when the decay would have no effect.
    pub fn new(decay_portion: f64, half_life_days: f64) -> Option<Self> {
        if decay_portion <= 0.0 || half_life_days <= 0.0 {
            return None;
        }
        Some(Recency {
            decay_portion: decay_portion.min(1.0),
            half_life_days,
        })
    }

    /// Decay constant per millisecond.
    pub fn decay_constant(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life_days / MILLIS_PER_DAY
    }

    /// Score multiplier for a page last edited `age_ms` milliseconds ago.
    pub fn multiplier(&self, age_ms: f64) -> f64 {
        (self.decay_constant() * -age_ms).exp_m1() * self.decay_portion + 1.0
    }
}

/// Everything the builder needs to emit function-score boosts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BoostSpec {
    /// Template name to multiplier.
    pub templates: Vec<(String, f64)>,

    /// Weight of every namespace being searched.
    pub namespace_weights: BTreeMap<i32, f64>,

    pub recency: Option<Recency>,

    /// Language code to multiplier, requester's language first.
    pub languages: Vec<(String, f64)>,
}

impl BoostSpec {
    /// Merge query directives with configured defaults.
    pub fn derive(
        parsed: &ParsedQuery,
        raw: &RawQuery,
        config: &SearchConfig,
        registry: &NamespaceRegistry,
    ) -> Self {
        let mut templates = None;
        let mut recency = None;
        for clause in &parsed.clauses {
            match clause {
                Clause::TemplateBoostDirective { templates: t } => templates = Some(t.clone()),
                Clause::RecencyDirective {
                    decay_portion,
                    half_life_days,
                } => recency = Some(Recency::new(*decay_portion, *half_life_days)),
                _ => {}
            }
        }

        let templates = templates.unwrap_or_else(|| parse_templates(&config.boost_templates));
        let recency = recency.unwrap_or_else(|| {
            Recency::new(
                config.recency.default_decay_portion,
                config.recency.default_half_life_days,
            )
        });

        let searched: BTreeSet<i32> = if raw.namespaces.is_empty() {
            registry.searchable()
        } else {
            raw.namespaces.clone()
        };
        let namespace_weights = searched
            .into_iter()
            .map(|id| (id, namespace_weight(id, config, registry)))
            .collect();

        let mut languages = Vec::new();
        let corpus = &config.language.corpus_language;
        let user = raw.user_language.as_deref().unwrap_or(corpus);
        if config.language.user_weight > 0.0 {
            languages.push((user.to_string(), config.language.user_weight));
        }
        if user != corpus && config.language.corpus_weight > 0.0 {
            languages.push((corpus.clone(), config.language.corpus_weight));
        }

        BoostSpec {
            templates,
            namespace_weights,
            recency,
            languages,
        }
    }

    /// Namespaces grouped by identical weight, dropping groups that would
    /// not change ranking.
    pub fn namespace_groups(&self) -> Vec<(f64, Vec<i32>)> {
        if self.namespace_weights.len() < 2 {
            return Vec::new();
        }
        let mut groups: Vec<(f64, Vec<i32>)> = Vec::new();
        for (&id, &weight) in &self.namespace_weights {
            match groups.iter_mut().find(|(w, _)| *w == weight) {
                Some((_, ids)) => ids.push(id),
                None => groups.push((weight, vec![id])),
            }
        }
        if groups.len() < 2 {
            return Vec::new();
        }
        groups.retain(|(weight, _)| *weight != 1.0);
        groups
    }
}

/// Weight of a namespace. Explicit weights win; talk namespaces follow
/// their subject namespace scaled by the talk weight.
pub fn namespace_weight(id: i32, config: &SearchConfig, registry: &NamespaceRegistry) -> f64 {
    let ns = &config.namespaces;
    if let Some(weight) = ns.weights.get(&id) {
        return *weight;
    }
    let subject_weight = |subject: i32| match ns.weights.get(&subject) {
        Some(weight) => *weight,
        None if ns.content_namespaces.contains(&subject) => 1.0,
        None => ns.default_weight,
    };
    if id == NS_TALK {
        ns.talk_weight
    } else if registry.is_talk(id) {
        ns.talk_weight * subject_weight(registry.subject(id))
    } else {
        subject_weight(id)
    }
}
