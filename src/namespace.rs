//! Namespace registry: names, talk/subject pairing and index routing.

use std::collections::{BTreeSet, HashMap};

use crate::config::NamespaceConfig;

pub const NS_MAIN: i32 = 0;
pub const NS_TALK: i32 = 1;
pub const NS_FILE: i32 = 6;
pub const NS_TEMPLATE: i32 = 10;

/// Index suffix for content namespaces.
pub const CONTENT_INDEX: &str = "content";
/// Index suffix for every other namespace.
pub const GENERAL_INDEX: &str = "general";

/// Read-only view of the configured namespaces.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    names: HashMap<i32, String>,
    lookup: HashMap<String, i32>,
    content: BTreeSet<i32>,
}

impl NamespaceRegistry {
    pub fn new(config: &NamespaceConfig) -> Self {
        let mut names = HashMap::new();
        let mut lookup = HashMap::new();
        for def in &config.registry {
            names.insert(def.id, def.name.clone());
            if !def.name.is_empty() {
                lookup.insert(normalize_name(&def.name), def.id);
            }
            for alias in &def.aliases {
                lookup.insert(normalize_name(alias), def.id);
            }
        }
        Self {
            names,
            lookup,
            content: config.content_namespaces.iter().copied().collect(),
        }
    }

    /// Canonical name of a namespace. The main namespace has an empty name.
    pub fn name(&self, id: i32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Find a namespace by name or alias, ignoring case and `_` vs space.
    pub fn lookup(&self, name: &str) -> Option<i32> {
        self.lookup.get(&normalize_name(name)).copied()
    }

    /// Every searchable (non-virtual) namespace id.
    pub fn searchable(&self) -> BTreeSet<i32> {
        self.names.keys().copied().filter(|id| *id >= 0).collect()
    }

    pub fn is_talk(&self, id: i32) -> bool {
        id > 0 && id % 2 == 1
    }

    /// The subject namespace paired with a talk namespace.
    pub fn subject(&self, id: i32) -> i32 {
        if self.is_talk(id) { id - 1 } else { id }
    }

    /// Index suffix that stores a namespace.
    pub fn index_suffix(&self, id: i32) -> &'static str {
        if self.content.contains(&id) {
            CONTENT_INDEX
        } else {
            GENERAL_INDEX
        }
    }

    /// Every searchable namespace stored in the index with this suffix.
    pub fn namespaces_in_index(&self, suffix: &str) -> BTreeSet<i32> {
        self.searchable()
            .into_iter()
            .filter(|id| self.index_suffix(*id) == suffix)
            .collect()
    }

    /// Split a leading `Namespace:` off a title.
    ///
    /// Returns the namespace and the remainder when the part before the
    /// first colon names a known namespace, `None` otherwise.
    pub fn split_prefix<'a>(&self, text: &'a str) -> Option<(i32, &'a str)> {
        let colon = text.find(':')?;
        let id = self.lookup(text[..colon].trim())?;
        Some((id, text[colon + 1..].trim_start()))
    }

    /// Prefixed text of a title, `Name:Title`, or just `Title` in the main
    /// namespace.
    pub fn prefixed_text(&self, id: i32, title: &str) -> String {
        match self.name(id) {
            Some(name) if !name.is_empty() => format!("{name}:{title}"),
            _ => title.to_string(),
        }
    }

    /// Normalize a `hastemplate:` value the way template transclusion names
    /// pages: a leading `:` means the main namespace, a bare name means the
    /// template namespace, an explicit namespace is kept.
    pub fn normalize_template(&self, value: &str) -> String {
        let value = value.trim();
        if let Some(main) = value.strip_prefix(':') {
            return main.trim().to_string();
        }
        match self.split_prefix(value) {
            Some((id, rest)) => self.prefixed_text(id, rest),
            None => self.prefixed_text(NS_TEMPLATE, value),
        }
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().replace('_', " ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NamespaceRegistry {
        NamespaceRegistry::new(&NamespaceConfig::default())
    }

    #[test]
    fn test_lookup_ignores_case_and_underscores() {
        let ns = registry();
        assert_eq!(ns.lookup("help"), Some(12));
        assert_eq!(ns.lookup("User_talk"), Some(3));
        assert_eq!(ns.lookup("image"), Some(6));
        assert_eq!(ns.lookup("Nope"), None);
    }

    #[test]
    fn test_split_prefix() {
        let ns = registry();
        assert_eq!(ns.split_prefix("Help:Foo"), Some((12, "Foo")));
        assert_eq!(ns.split_prefix("Help:"), Some((12, "")));
        assert_eq!(ns.split_prefix("Foo:Bar"), None);
        assert_eq!(ns.split_prefix("Foo"), None);
    }

    #[test]
    fn test_talk_pairing() {
        let ns = registry();
        assert!(ns.is_talk(1));
        assert!(!ns.is_talk(0));
        assert_eq!(ns.subject(13), 12);
        assert_eq!(ns.subject(12), 12);
    }

    #[test]
    fn test_index_routing() {
        let ns = registry();
        assert_eq!(ns.index_suffix(0), CONTENT_INDEX);
        assert_eq!(ns.index_suffix(1), GENERAL_INDEX);
        assert_eq!(ns.namespaces_in_index(CONTENT_INDEX), BTreeSet::from([0]));
        assert!(!ns.namespaces_in_index(GENERAL_INDEX).contains(&-1));
    }

    #[test]
    fn test_normalize_template() {
        let ns = registry();
        assert_eq!(ns.normalize_template("Stub"), "Template:Stub");
        assert_eq!(ns.normalize_template(":Main Page"), "Main Page");
        assert_eq!(ns.normalize_template("User:Foo/box"), "User:Foo/box");
        assert_eq!(ns.normalize_template("template:Stub"), "Template:Stub");
    }
}
