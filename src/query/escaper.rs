//! Escaping of user text before it reaches the backend query parser.
//!
//! [`Escaper::escape_term`] neutralizes characters a user must not be able to
//! inject (grouping, field selection, boosts, ranges, regexes).
//! [`Escaper::escape_whole`] then repairs operators that are syntactically
//! dangling so the backend parser accepts the whole string. Neither function
//! can fail.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use unicode_segmentation::UnicodeSegmentation;

lazy_static! {
    static ref FUZZY_RE: Regex = Regex::new(r#"(?P<lead>[^\s"\\])~(?P<trail>\S*)"#).unwrap();
    static ref PROXIMITY_RE: Regex = Regex::new(r#""~(?P<trail>\S*)"#).unwrap();
    static ref GERSHAYIM_RE: Regex = Regex::new(r#"(\p{Hebrew}\p{M}*)"(\p{Hebrew})"#).unwrap();
}

/// Characters escaped by [`Escaper::escape_term`].
const INJECTABLE: &[char] = &['/', '(', ')', '{', '}', '[', ']', '^', ':'];

/// Characters that may legitimately follow a backslash in escaped text.
const ESCAPABLE: &[char] = &[
    '/', '(', ')', '{', '}', '[', ']', '^', ':', '\\', '"', '~', '+', '-', '!', '&', '|', '*', '?',
];

/// Fuzzy edit distances the backend accepts after `~`.
const ALLOWED_FUZZINESS: &[&str] = &["", "0", "1", "2"];

/// Escapes user text for the backend's query-string syntax.
#[derive(Debug, Clone)]
pub struct Escaper {
    language: String,
}

impl Escaper {
    /// Create an escaper for a corpus language.
    pub fn new(language: impl Into<String>) -> Self {
        Escaper {
            language: language.into(),
        }
    }

    /// Escape characters that would let a user reach backend syntax directly.
    ///
    /// An existing backslash escape is kept as is, so escaping already
    /// escaped text changes nothing.
    pub fn escape_term(&self, text: &str) -> String {
        let text = self.escape_quotes(text);
        let mut out = String::with_capacity(text.len() + 8);
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.peek() {
                    Some(&next) if ESCAPABLE.contains(&next) => {
                        out.push('\\');
                        out.push(next);
                        chars.next();
                    }
                    _ => out.push_str("\\\\"),
                }
            } else if INJECTABLE.contains(&c) {
                out.push('\\');
                out.push(c);
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Repair the whole query string so the backend parser accepts it.
    ///
    /// Returns the repaired text and whether it still asks for a fuzzy match.
    pub fn escape_whole(&self, text: &str) -> (String, bool) {
        let mut fuzzy = false;

        let text = FUZZY_RE.replace_all(text, |caps: &Captures| {
            let trail = &caps["trail"];
            if ALLOWED_FUZZINESS.contains(&trail) {
                fuzzy = true;
                caps[0].to_string()
            } else {
                format!("{}\\~{}", &caps["lead"], trail)
            }
        });

        let text = PROXIMITY_RE.replace_all(&text, |caps: &Captures| {
            let trail = &caps["trail"];
            if !trail.is_empty() && trail.chars().all(|c| c.is_ascii_digit()) {
                caps[0].to_string()
            } else {
                format!("\"\\~{trail}")
            }
        });

        let text = escape_dangling_operators(&text);
        let text = lowercase_dangling_keywords(&text);
        (balance_quotes(&text), fuzzy)
    }

    /// Escape `"` used as gershayim inside Hebrew words.
    pub fn escape_quotes(&self, text: &str) -> String {
        if self.language == "he" {
            GERSHAYIM_RE.replace_all(text, r#"$1\"$2"#).into_owned()
        } else {
            text.to_string()
        }
    }
}

/// Append a closing quote when the text has an odd number of unescaped
/// quotes.
pub fn balance_quotes(text: &str) -> String {
    if has_open_quote(text) {
        format!("{text}\"")
    } else {
        text.to_string()
    }
}

/// True when an unescaped quote is left open at the end of the text.
pub fn has_open_quote(text: &str) -> bool {
    let mut in_quote = false;
    let mut in_escape = false;
    for c in text.chars() {
        if in_escape {
            in_escape = false;
            continue;
        }
        match c {
            '"' => in_quote = !in_quote,
            '\\' => in_escape = true,
            _ => {}
        }
    }
    in_quote
}

/// Number of words in the text.
pub fn term_count(text: &str) -> usize {
    text.unicode_words().count()
}

/// True when the text still holds boolean operators or wildcards that the
/// backend will interpret.
pub fn contains_operators(text: &str) -> bool {
    if text.contains("&&") || text.contains("||") {
        return true;
    }
    text.split_whitespace().any(|token| {
        matches!(token, "AND" | "OR" | "NOT")
            || token.len() > 1 && token.starts_with(['+', '-', '!'])
            || token.contains(['*', '?'])
    })
}

/// Escape `+`, `-` and `!` that are not followed by a term, and `&&`/`||`
/// with nothing on one side.
fn escape_dangling_operators(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let first_term = chars.iter().position(|c| !c.is_whitespace());
    let last_term = chars.iter().rposition(|c| !c.is_whitespace());
    let mut out = String::with_capacity(text.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let escaped = i > 0 && chars[i - 1] == '\\';
        if !escaped && matches!(c, '+' | '-' | '!') {
            let followed_by_term = chars.get(i + 1).is_some_and(|next| !next.is_whitespace());
            if !followed_by_term {
                out.push('\\');
            }
            out.push(c);
            i += 1;
            continue;
        }
        if !escaped && matches!(c, '&' | '|') && chars.get(i + 1) == Some(&c) {
            let nothing_before = first_term.is_none_or(|first| first >= i);
            let nothing_after = last_term.is_none_or(|last| last < i + 2);
            if nothing_before || nothing_after {
                out.push('\\');
                out.push(c);
                out.push('\\');
                out.push(c);
            } else {
                out.push(c);
                out.push(c);
            }
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Lowercase `AND`/`OR` without a term on both sides and `NOT` without a
/// term after it, outside of phrases.
fn lowercase_dangling_keywords(text: &str) -> String {
    let tokens = unquoted_tokens(text);
    let mut out = text.to_string();
    for (idx, &(start, end)) in tokens.iter().enumerate() {
        let token = &text[start..end];
        if !matches!(token, "AND" | "OR" | "NOT") {
            continue;
        }
        let prev = idx.checked_sub(1).map(|p| &text[tokens[p].0..tokens[p].1]);
        let next = tokens.get(idx + 1).map(|n| &text[n.0..n.1]);
        let is_term = |t: Option<&str>, allow_not: bool| match t {
            Some("AND") | Some("OR") => false,
            Some("NOT") => allow_not,
            Some(_) => true,
            None => false,
        };
        let valid = match token {
            "NOT" => is_term(next, false),
            _ => is_term(prev, false) && is_term(next, true),
        };
        if !valid {
            out.replace_range(start..end, &token.to_lowercase());
        }
    }
    out
}

/// Byte ranges of whitespace separated tokens that are not inside a phrase.
fn unquoted_tokens(text: &str) -> Vec<(usize, usize)> {
    let mut tokens = Vec::new();
    let mut in_quote = false;
    let mut in_escape = false;
    let mut start: Option<usize> = None;
    let mut token_quoted = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                if !token_quoted {
                    tokens.push((s, i));
                }
            }
            in_escape = false;
            continue;
        }
        if start.is_none() {
            start = Some(i);
            token_quoted = in_quote;
        }
        if in_escape {
            in_escape = false;
        } else if c == '\\' {
            in_escape = true;
        } else if c == '"' {
            in_quote = !in_quote;
            token_quoted = true;
        }
    }
    if let Some(s) = start {
        if !token_quoted {
            tokens.push((s, text.len()));
        }
    }
    tokens
}
