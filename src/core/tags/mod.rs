//! # Tags Module
//!
//! Tag categorisation and the lowercase search terms stored with a record.
//!
//! A tag is either plain (`sunset`) or categorized (`artist:someone`). Only
//! the first colon separates category from name.

use crate::core::store::RecordStore;
use crate::error::StoreError;
use std::collections::{BTreeMap, HashSet};
use std::ops::ControlFlow;

/// Category given to tags without one
pub const GENERAL_CATEGORY: &str = "general";

/// Maximum number of suggestions returned by [`search_tags`]
pub const MAX_SEARCH_RESULTS: usize = 30;

/// Split a tag into its category and name.
///
/// Returns `None` for the category when the tag is plain or either side of
/// the colon is empty.
pub fn split_tag(tag: &str) -> (Option<&str>, &str) {
    match tag.split_once(':') {
        Some((category, name)) if !category.is_empty() && !name.is_empty() => {
            (Some(category), name)
        }
        _ => (None, tag),
    }
}

/// Group tags by category, preserving input order within each category
pub fn categorize(tags: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for tag in tags {
        let (category, name) = split_tag(tag);
        groups
            .entry(category.unwrap_or(GENERAL_CATEGORY).to_string())
            .or_default()
            .push(name.to_string());
    }
    groups
}

/// Lowercase terms a record is searchable by: every full tag, plus the
/// bare name of categorized tags.
pub fn search_terms(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut terms = Vec::new();

    for tag in tags {
        let full = tag.to_lowercase();
        let name = match split_tag(tag) {
            (Some(_), name) => Some(name.to_lowercase()),
            (None, _) => None,
        };
        for term in std::iter::once(full).chain(name) {
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
    }

    terms
}

/// Tags in the store containing `query`, case-insensitively.
///
/// Unique, in first-seen storage order, at most [`MAX_SEARCH_RESULTS`].
pub fn search_tags(store: &dyn RecordStore, query: &str) -> Result<Vec<String>, StoreError> {
    let needle = query.to_lowercase();
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    store.scan(&mut |record| {
        // Unreadable records just don't contribute suggestions
        if let Ok(record) = record {
            for tag in record.tags {
                if tag.to_lowercase().contains(&needle) && seen.insert(tag.clone()) {
                    found.push(tag);
                    if found.len() == MAX_SEARCH_RESULTS {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
        ControlFlow::Continue(())
    })?;

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{InMemoryStore, NewRecord};

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn splits_on_first_colon_only() {
        assert_eq!(split_tag("artist:some:one"), (Some("artist"), "some:one"));
        assert_eq!(split_tag("sunset"), (None, "sunset"));
        assert_eq!(split_tag(":odd"), (None, ":odd"));
        assert_eq!(split_tag("odd:"), (None, "odd:"));
    }

    #[test]
    fn categorize_groups_plain_tags_as_general() {
        let groups = categorize(&tags(&["artist:Ann", "sunset", "artist:Bo", "series:X"]));

        assert_eq!(groups["artist"], vec!["Ann", "Bo"]);
        assert_eq!(groups["series"], vec!["X"]);
        assert_eq!(groups[GENERAL_CATEGORY], vec!["sunset"]);
    }

    #[test]
    fn search_terms_include_lowercase_name_part() {
        let terms = search_terms(&tags(&["Artist:Ann", "Sunset"]));
        assert_eq!(terms, vec!["artist:ann", "ann", "sunset"]);
    }

    #[test]
    fn search_terms_are_unique() {
        let terms = search_terms(&tags(&["ann", "artist:Ann"]));
        assert_eq!(terms, vec!["ann", "artist:ann"]);
    }

    #[test]
    fn search_is_case_insensitive_and_unique() {
        let store = InMemoryStore::new();
        store
            .insert(NewRecord::new("https://a", "https://a/1.png", tags(&["Sunset", "beach"])))
            .unwrap();
        store
            .insert(NewRecord::new("https://b", "https://b/2.png", tags(&["Sunset", "sunrise"])))
            .unwrap();

        let found = search_tags(&store, "SUN").unwrap();
        assert_eq!(found, vec!["Sunset", "sunrise"]);
    }

    #[test]
    fn search_caps_results() {
        let store = InMemoryStore::new();
        let many: Vec<String> = (0..45).map(|i| format!("tag{i}")).collect();
        store
            .insert(NewRecord::new("https://a", "https://a/1.png", many))
            .unwrap();

        assert_eq!(search_tags(&store, "tag").unwrap().len(), MAX_SEARCH_RESULTS);
    }
}
