use std::collections::BTreeMap;

use ifilm_common::ItemKind;

use crate::cache::{derive_key, CACHE_BUST_PARAMS};

/// Parameters for an `/Items` query.
///
/// Parameters are kept sorted so that the derived cache key does not depend on
/// the order they were added in. Cache-busting parameters (`_t`,
/// `bypassCache`) may be set like any other and are stripped before the
/// request goes upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemQuery {
    params: BTreeMap<String, String>,
}

impl ItemQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set a parameter only when a value is present.
    pub fn param_opt(self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    pub fn item_types(self, kinds: &[ItemKind]) -> Self {
        let names: Vec<&str> = kinds.iter().map(|k| k.upstream_name()).collect();
        self.param("IncludeItemTypes", names.join(","))
    }

    pub fn parent(self, parent_id: impl Into<String>) -> Self {
        self.param("ParentId", parent_id)
    }

    pub fn search_term(self, term: impl Into<String>) -> Self {
        self.param("SearchTerm", term)
    }

    pub fn limit(self, limit: u32) -> Self {
        self.param("Limit", limit.to_string())
    }

    pub fn start_index(self, start: u32) -> Self {
        self.param("StartIndex", start.to_string())
    }

    pub fn sort(self, by: impl Into<String>, order: impl Into<String>) -> Self {
        self.param("SortBy", by).param("SortOrder", order)
    }

    /// Skip the cache read for this query; the fresh result is still stored.
    pub fn bypass_cache(self) -> Self {
        self.param("bypassCache", "true")
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self.get("bypassCache"), Some("true") | Some("1"))
    }

    /// Whether the query lists Movies or Series, whose results must expire fast.
    pub fn targets_volatile_kinds(&self) -> bool {
        self.get("IncludeItemTypes").is_some_and(|types| {
            types.split(',').any(|t| {
                let t = t.trim();
                t.eq_ignore_ascii_case(ItemKind::Movie.upstream_name())
                    || t.eq_ignore_ascii_case(ItemKind::Series.upstream_name())
            })
        })
    }

    pub fn cache_key(&self) -> String {
        derive_key("items", &self.params)
    }

    /// Parameters as sent upstream.
    pub fn upstream_params(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .filter(|(name, _)| !CACHE_BUST_PARAMS.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }
}
