//! Structured clauses pulled out of a raw query string.

use serde::Serialize;

/// Keywords of the generic `key:value` directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyword {
    InCategory,
    HasTemplate,
    LinksTo,
    InTitle,
    InSource,
    BoostTemplates,
}

impl Keyword {
    pub const ALL: [Keyword; 6] = [
        Keyword::InCategory,
        Keyword::HasTemplate,
        Keyword::LinksTo,
        Keyword::InTitle,
        Keyword::InSource,
        Keyword::BoostTemplates,
    ];

    /// The directive name as typed by users.
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::InCategory => "incategory",
            Keyword::HasTemplate => "hastemplate",
            Keyword::LinksTo => "linksto",
            Keyword::InTitle => "intitle",
            Keyword::InSource => "insource",
            Keyword::BoostTemplates => "boost-templates",
        }
    }

    pub fn parse(name: &str) -> Option<Keyword> {
        Keyword::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(name))
    }
}

/// One structured piece of a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Clause {
    /// A quoted phrase.
    Phrase {
        text: String,
        /// Explicit `~N` proximity.
        slop: Option<u32>,
        /// Trailing `~`: match the phrase on stemmed fields.
        fuzzy: bool,
    },

    /// Title must start with `prefix`, optionally restricted to a namespace.
    PrefixFilter {
        prefix: String,
        namespace: Option<i32>,
    },

    /// Page must be in a category.
    CategoryFilter { category: String },

    /// `linksto:`, `hastemplate:`, `intitle:` and non-regex `insource:`.
    KeywordFilter { keyword: Keyword, value: String },

    /// The inner clause must not match.
    NotFilter(Box<Clause>),

    /// Multiply scores of pages using these templates.
    TemplateBoostDirective { templates: Vec<(String, f64)> },

    /// Source text must match a regular expression.
    RegexSourceFilter {
        pattern: String,
        case_sensitive: bool,
    },

    /// Decay scores of older pages.
    RecencyDirective {
        decay_portion: f64,
        half_life_days: f64,
    },

    /// Search only the local corpus.
    LocalityDirective,

    /// A bare `term*` token.
    WildcardTerm { term: String },
}

impl Clause {
    /// Wrap a clause in a negation.
    pub fn negate(self) -> Clause {
        Clause::NotFilter(Box::new(self))
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Clause::NotFilter(_))
    }

    /// Clauses that restrict the matching documents.
    pub fn is_filter(&self) -> bool {
        match self {
            Clause::PrefixFilter { .. }
            | Clause::CategoryFilter { .. }
            | Clause::KeywordFilter { .. }
            | Clause::RegexSourceFilter { .. } => true,
            Clause::NotFilter(inner) => inner.is_filter() || matches!(**inner, Clause::Phrase { .. }),
            _ => false,
        }
    }

    /// Clauses that only change scoring or routing.
    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            Clause::TemplateBoostDirective { .. }
                | Clause::RecencyDirective { .. }
                | Clause::LocalityDirective
        )
    }

    /// True for a regex clause, negated or not.
    pub fn uses_regex(&self) -> bool {
        match self {
            Clause::RegexSourceFilter { .. } => true,
            Clause::NotFilter(inner) => inner.uses_regex(),
            _ => false,
        }
    }
}
