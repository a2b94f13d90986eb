//! Clause extraction.
//!
//! The raw query is run through [`STAGES`] in order. Each stage is a plain
//! function from the current residual text to a new residual text, the
//! clauses it recognized and the spans it consumed. Later stages rely on
//! earlier ones: phrases are pulled out only after every `key:value`
//! directive had its chance at quoted values, and wildcard tokens only
//! after phrases are gone. Stages never look inside quoted text, except the
//! phrase stage itself.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::debug;

use crate::config::RecencyConfig;
use crate::namespace::NamespaceRegistry;
use crate::query::boost::parse_templates;
use crate::query::clause::{Clause, Keyword};
use crate::query::escaper::{Escaper, balance_quotes, contains_operators};
use crate::query::parsed::{ConsumedSpan, ParsedQuery, Placement};

lazy_static! {
    static ref PREFIX_RE: Regex =
        Regex::new(r#"(?i)(?P<lead>^|\s)prefix:(?:"(?P<quoted>(?:[^"\\]|\\.)*)"|(?P<value>\S+))"#)
            .unwrap();
    static ref PREFER_RECENT_RE: Regex = Regex::new(
        r"(?i)(?P<lead>^|\s)prefer-recent:(?P<decay>1|0?(?:\.[0-9]+)?)?(?:,(?P<half>[0-9]*\.?[0-9]+))?"
    )
    .unwrap();
    static ref LOCAL_RE: Regex = Regex::new(r"(?i)(?P<lead>^|\s)local:(?P<rest>\S*)").unwrap();
    static ref INSOURCE_REGEX_RE: Regex = Regex::new(
        r"(?P<lead>^|\s)(?P<not>-)?insource:/(?P<pattern>(?:[^\\/]|\\.)+)/(?P<insensitive>i)?"
    )
    .unwrap();
    static ref KEYWORD_RE: Regex = {
        let names = Keyword::ALL
            .iter()
            .map(|k| regex::escape(k.as_str()))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(
            r#"(?i)(?P<lead>^|\s)(?P<neg>[-!])?(?P<key>{names}):\s*(?:"(?P<quoted>(?:[^"\\]|\\.)+)"|(?P<value>[^"\s]\S*))"#
        ))
        .unwrap()
    };
}

/// Settings the stages read.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub namespaces: &'a NamespaceRegistry,
    pub recency: &'a RecencyConfig,
    pub regex_enabled: bool,
}

/// What a stage produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub residual: String,
    pub clauses: Vec<Clause>,
    pub consumed: Vec<ConsumedSpan>,
}

impl StageOutput {
    fn unchanged(text: &str) -> Self {
        StageOutput {
            residual: text.to_string(),
            ..Default::default()
        }
    }
}

/// A single extraction pass.
pub type Stage = fn(&StageContext<'_>, &str) -> StageOutput;

/// Extraction passes in the order they run.
pub const STAGES: &[(&str, Stage)] = &[
    ("prefix", prefix_stage),
    ("prefer_recent", prefer_recent_stage),
    ("local", local_stage),
    ("insource_regex", insource_regex_stage),
    ("keyword", keyword_stage),
    ("phrase", phrase_stage),
    ("wildcard", wildcard_stage),
];

/// Turns raw query text into a [`ParsedQuery`].
#[derive(Debug, Clone)]
pub struct Extractor<'a> {
    context: StageContext<'a>,
    escaper: &'a Escaper,
}

impl<'a> Extractor<'a> {
    pub fn new(context: StageContext<'a>, escaper: &'a Escaper) -> Self {
        Extractor { context, escaper }
    }

    pub fn extract(&self, raw: &str) -> ParsedQuery {
        let mut residual = raw.to_string();
        let mut clauses = Vec::new();
        let mut consumed = Vec::new();
        for (name, stage) in STAGES {
            let output = stage(&self.context, &residual);
            if !output.clauses.is_empty() {
                debug!(stage = name, clauses = output.clauses.len(), "Extracted clauses");
            }
            residual = output.residual;
            clauses.extend(output.clauses);
            consumed.extend(output.consumed);
        }

        let text = residual.split_whitespace().collect::<Vec<_>>().join(" ");
        let skip_suggest = contains_operators(&text) || clauses.iter().any(is_wildcard_clause);
        let (escaped, fuzzy) = self.escaper.escape_whole(&self.escaper.escape_term(&text));

        ParsedQuery {
            special_syntax: !clauses.is_empty() || skip_suggest,
            text,
            residual: escaped,
            clauses,
            consumed,
            fuzzy,
            skip_suggest,
        }
    }
}

fn is_wildcard_clause(clause: &Clause) -> bool {
    match clause {
        Clause::NotFilter(inner) => is_wildcard_clause(inner),
        other => matches!(other, Clause::WildcardTerm { .. }),
    }
}

/// Byte ranges inside quotes. An unclosed quote runs to the end.
fn quoted_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open: Option<usize> = None;
    let mut in_escape = false;
    for (i, c) in text.char_indices() {
        if in_escape {
            in_escape = false;
            continue;
        }
        match c {
            '\\' => in_escape = true,
            '"' => match open.take() {
                Some(start) => ranges.push((start, i + 1)),
                None => open = Some(i),
            },
            _ => {}
        }
    }
    if let Some(start) = open {
        ranges.push((start, text.len()));
    }
    ranges
}

fn inside(ranges: &[(usize, usize)], pos: usize) -> bool {
    ranges.iter().any(|&(start, end)| pos > start && pos < end)
}

/// What a matched span turns into.
struct Replacement {
    clauses: Vec<Clause>,
    /// Text left in place of the span.
    keep: String,
    placement: Placement,
}

/// Replace every match of `re` outside quotes for which `f` returns a
/// replacement. A match `f` declines is left untouched.
fn consume<F>(text: &str, re: &Regex, mut f: F) -> StageOutput
where
    F: FnMut(&Captures<'_>) -> Option<Replacement>,
{
    let protected = quoted_ranges(text);
    let mut output = StageOutput::default();
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let lead = caps.name("lead").map_or("", |m| m.as_str());
        let start = whole.start() + lead.len();
        if inside(&protected, start) {
            continue;
        }
        let Some(replacement) = f(&caps) else { continue };
        output.residual.push_str(&text[last..whole.start()]);
        output.residual.push_str(lead);
        output.residual.push_str(&replacement.keep);
        output.consumed.push(ConsumedSpan {
            text: text[start..whole.end()].to_string(),
            placement: replacement.placement,
        });
        output.clauses.extend(replacement.clauses);
        last = whole.end();
    }
    output.residual.push_str(&text[last..]);
    output
}

fn unescape_quotes(text: &str) -> String {
    text.replace("\\\"", "\"")
}

fn value_of(caps: &Captures<'_>) -> Option<String> {
    caps.name("quoted")
        .map(|m| unescape_quotes(m.as_str()))
        .or_else(|| caps.name("value").map(|m| m.as_str().to_string()))
}

fn prefix_stage(ctx: &StageContext<'_>, text: &str) -> StageOutput {
    consume(text, &PREFIX_RE, |caps| {
        let value = value_of(caps)?;
        let (namespace, prefix) = match ctx.namespaces.split_prefix(&value) {
            Some((id, rest)) => (Some(id), rest.to_string()),
            None => (None, value.clone()),
        };
        Some(Replacement {
            clauses: vec![Clause::PrefixFilter { prefix, namespace }],
            keep: String::new(),
            placement: Placement::Suffix,
        })
    })
}

fn prefer_recent_stage(ctx: &StageContext<'_>, text: &str) -> StageOutput {
    consume(text, &PREFER_RECENT_RE, |caps| {
        let number = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
                .and_then(|s| s.parse::<f64>().ok())
        };
        Some(Replacement {
            clauses: vec![Clause::RecencyDirective {
                decay_portion: number("decay").unwrap_or(ctx.recency.unspecified_decay_portion),
                half_life_days: number("half").unwrap_or(ctx.recency.default_half_life_days),
            }],
            keep: String::new(),
            placement: Placement::Prefix,
        })
    })
}

fn local_stage(_ctx: &StageContext<'_>, text: &str) -> StageOutput {
    consume(text, &LOCAL_RE, |caps| {
        if !caps["rest"].is_empty() {
            return None;
        }
        Some(Replacement {
            clauses: vec![Clause::LocalityDirective],
            keep: String::new(),
            placement: Placement::Prefix,
        })
    })
}

fn insource_regex_stage(ctx: &StageContext<'_>, text: &str) -> StageOutput {
    if !ctx.regex_enabled {
        return StageOutput::unchanged(text);
    }
    consume(text, &INSOURCE_REGEX_RE, |caps| {
        let clause = Clause::RegexSourceFilter {
            pattern: caps["pattern"].to_string(),
            case_sensitive: caps.name("insensitive").is_none(),
        };
        let clause = if caps.name("not").is_some() {
            clause.negate()
        } else {
            clause
        };
        Some(Replacement {
            clauses: vec![clause],
            keep: String::new(),
            placement: Placement::Prefix,
        })
    })
}

fn keyword_stage(ctx: &StageContext<'_>, text: &str) -> StageOutput {
    consume(text, &KEYWORD_RE, |caps| {
        let keyword = Keyword::parse(&caps["key"])?;
        let value = value_of(caps)?;
        let negated = caps.name("neg").is_some();
        let mut keep = String::new();

        let clause = match keyword {
            Keyword::InCategory => Clause::CategoryFilter {
                category: value.replace('_', " "),
            },
            Keyword::HasTemplate => Clause::KeywordFilter {
                keyword,
                value: ctx.namespaces.normalize_template(&value),
            },
            Keyword::InSource if caps.name("value").is_some() && value.starts_with('/') => {
                return None;
            }
            Keyword::BoostTemplates => {
                return Some(Replacement {
                    clauses: vec![Clause::TemplateBoostDirective {
                        templates: parse_templates(&value),
                    }],
                    keep,
                    placement: Placement::Prefix,
                });
            }
            Keyword::InTitle => {
                if !negated {
                    keep = match caps.name("quoted") {
                        Some(quoted) => format!("\"{}\"", quoted.as_str()),
                        None => value.clone(),
                    };
                }
                Clause::KeywordFilter { keyword, value }
            }
            Keyword::LinksTo | Keyword::InSource => Clause::KeywordFilter { keyword, value },
        };

        Some(Replacement {
            clauses: vec![if negated { clause.negate() } else { clause }],
            keep,
            placement: Placement::Prefix,
        })
    })
}

fn phrase_stage(_ctx: &StageContext<'_>, text: &str) -> StageOutput {
    let text = balance_quotes(text);
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut output = StageOutput::default();
    let mut last = 0;
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        if c == '\\' {
            i += 2;
            continue;
        }
        if c != '"' {
            i += 1;
            continue;
        }

        // Find the closing quote.
        let mut j = i + 1;
        while j < chars.len() && chars[j].1 != '"' {
            j += if chars[j].1 == '\\' { 2 } else { 1 };
        }
        if j >= chars.len() {
            break;
        }
        let body = &text[pos + 1..chars[j].0];
        let mut end = j + 1;

        // Trailing `~N` proximity, then a trailing `~` fuzzy marker.
        let mut slop = None;
        if end < chars.len() && chars[end].1 == '~' {
            let digits: String = chars[end + 1..]
                .iter()
                .map(|&(_, c)| c)
                .take_while(char::is_ascii_digit)
                .collect();
            if !digits.is_empty() {
                slop = digits.parse::<u32>().ok();
                end += 1 + digits.len();
            }
        }
        let mut fuzzy = false;
        if end < chars.len()
            && chars[end].1 == '~'
            && chars.get(end + 1).is_none_or(|&(_, c)| c.is_whitespace())
        {
            fuzzy = true;
            end += 1;
        }

        // A leading `-` or `!` at the start of a token negates the phrase.
        let mut start = pos;
        let mut negated = false;
        if i > 0 && matches!(chars[i - 1].1, '-' | '!') {
            let token_start = i < 2 || chars[i - 2].1.is_whitespace();
            if token_start && chars[i - 1].0 >= last {
                negated = true;
                start = chars[i - 1].0;
            }
        }

        let span_end = chars.get(end).map_or(text.len(), |&(p, _)| p);
        output.residual.push_str(&text[last..start]);
        output.residual.push(' ');
        if !body.trim().is_empty() {
            output.consumed.push(ConsumedSpan {
                text: text[start..span_end].to_string(),
                placement: Placement::Prefix,
            });
            let clause = Clause::Phrase {
                text: unescape_quotes(body),
                slop,
                fuzzy,
            };
            output
                .clauses
                .push(if negated { clause.negate() } else { clause });
        }
        last = span_end;
        i = end;
    }
    output.residual.push_str(&text[last..]);
    output
}

fn wildcard_stage(_ctx: &StageContext<'_>, text: &str) -> StageOutput {
    let mut output = StageOutput::default();
    let mut kept = Vec::new();
    for token in text.split_whitespace() {
        let (negated, term) = match token.strip_prefix(['-', '!']) {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let is_wildcard = term.contains('*')
            && !term.starts_with('*')
            && term.chars().all(|c| c == '*' || c.is_alphanumeric() || c == '_');
        if is_wildcard {
            output.consumed.push(ConsumedSpan {
                text: token.to_string(),
                placement: Placement::Prefix,
            });
            let clause = Clause::WildcardTerm {
                term: term.to_string(),
            };
            output
                .clauses
                .push(if negated { clause.negate() } else { clause });
        } else {
            kept.push(token);
        }
    }
    output.residual = kept.join(" ");
    output
}
