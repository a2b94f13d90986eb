//! Snippet handling: marker-preserving HTML escaping and redirect lookup.

use crate::backend::{RawHit, RedirectRef};

/// HTML-escape `&`, `<`, `>`, `"` and `'`.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape a highlighted fragment for HTML output, keeping the marker pair
/// intact.
pub fn escape_snippet(fragment: &str, pre: &str, post: &str) -> String {
    html_escape(fragment)
        .replace(&html_escape(pre), pre)
        .replace(&html_escape(post), post)
}

/// The fragment text with every marker removed.
pub fn strip_markers(fragment: &str, pre: &str, post: &str) -> String {
    fragment.replace(pre, "").replace(post, "")
}

/// First fragment for a field, falling back to its unstemmed copy.
pub fn fragment<'a>(hit: &'a RawHit, field: &str) -> Option<&'a str> {
    let first = |name: &str| {
        hit.highlight
            .get(name)
            .and_then(|fragments| fragments.first())
            .map(String::as_str)
    };
    first(field).or_else(|| first(&format!("{field}.plain")))
}

/// The stored redirect whose title is the highlighted text, lowest
/// namespace first.
pub fn find_redirect(
    fragment: &str,
    redirects: &[RedirectRef],
    pre: &str,
    post: &str,
) -> Option<RedirectRef> {
    let title = strip_markers(fragment, pre, post);
    redirects
        .iter()
        .filter(|redirect| redirect.title == title)
        .min_by_key(|redirect| redirect.namespace)
        .cloned()
}
