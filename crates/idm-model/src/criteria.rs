//! Secondary search criteria.
//!
//! Criteria are orthogonal to query dimensions: they are applied once to a
//! resolved candidate list (or pushed down to the store when a single
//! dimension is resolved).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::identity::{Attributes, IdentityObject};

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// Result window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Index of the first result to return.
    pub first_result: usize,
    /// Maximum number of results; zero means no limit.
    pub max_results: usize,
}

/// The kinds of criteria a store may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriteriaKind {
    /// Ordering by name.
    Sort,
    /// Ordering by an attribute value.
    SortByAttribute,
    /// Result windowing.
    Page,
    /// Attribute value filters.
    AttributeFilter,
    /// Name wildcard filter.
    NameFilter,
}

/// Search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Sort order, if sorting was requested.
    pub sort: Option<SortOrder>,
    /// Attribute to sort by instead of the name.
    pub sort_attribute: Option<String>,
    /// Result window.
    pub page: Option<Page>,
    /// Attribute name -> required values (wildcards allowed).
    pub attribute_filters: BTreeMap<String, Vec<String>>,
    /// Name wildcard filter.
    pub name_filter: Option<String>,
}

impl SearchCriteria {
    /// Creates empty criteria.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests sorting.
    #[must_use]
    pub const fn sorted(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    /// Sorts by an attribute instead of the name.
    #[must_use]
    pub fn sort_attribute(mut self, name: impl Into<String>) -> Self {
        self.sort_attribute = Some(name.into());
        self
    }

    /// Sets the result window.
    #[must_use]
    pub const fn paged(mut self, first_result: usize, max_results: usize) -> Self {
        self.page = Some(Page {
            first_result,
            max_results,
        });
        self
    }

    /// Adds an attribute value filter.
    #[must_use]
    pub fn attribute_filter(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.attribute_filters.insert(name.into(), values);
        self
    }

    /// Sets the name wildcard filter.
    #[must_use]
    pub fn name_filter(mut self, pattern: impl Into<String>) -> Self {
        self.name_filter = Some(pattern.into());
        self
    }

    /// Checks whether no modifier is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sort.is_none()
            && self.sort_attribute.is_none()
            && self.page.is_none()
            && self.attribute_filters.is_empty()
            && self.name_filter.is_none()
    }

    /// Checks whether applying the criteria needs entity attributes.
    #[must_use]
    pub fn needs_attributes(&self) -> bool {
        !self.attribute_filters.is_empty() || self.sort_attribute.is_some()
    }

    /// Returns the kinds of criteria in use.
    #[must_use]
    pub fn kinds(&self) -> BTreeSet<CriteriaKind> {
        let mut kinds = BTreeSet::new();
        if self.sort.is_some() {
            kinds.insert(CriteriaKind::Sort);
        }
        if self.sort_attribute.is_some() {
            kinds.insert(CriteriaKind::SortByAttribute);
        }
        if self.page.is_some() {
            kinds.insert(CriteriaKind::Page);
        }
        if !self.attribute_filters.is_empty() {
            kinds.insert(CriteriaKind::AttributeFilter);
        }
        if self.name_filter.is_some() {
            kinds.insert(CriteriaKind::NameFilter);
        }
        kinds
    }

    /// Returns a copy keeping only the filters, without sort or page.
    ///
    /// Used where intermediate results must not be truncated.
    #[must_use]
    pub fn filters_only(&self) -> Self {
        Self {
            sort: None,
            sort_attribute: None,
            page: None,
            attribute_filters: self.attribute_filters.clone(),
            name_filter: self.name_filter.clone(),
        }
    }

    /// Checks a name against the name filter.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name_filter
            .as_deref()
            .map_or(true, |pattern| wildcard_match(pattern, name))
    }

    /// Checks attributes against the attribute filters.
    ///
    /// Every filter value must match at least one stored value.
    #[must_use]
    pub fn matches_attributes(&self, attributes: &Attributes) -> bool {
        self.attribute_filters.iter().all(|(name, wanted)| {
            let stored = attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_slice())
                .unwrap_or_default();
            wanted
                .iter()
                .all(|pattern| stored.iter().any(|value| wildcard_match(pattern, value)))
        })
    }

    /// Sorts identity objects by name when sorting was requested.
    pub fn sort_by_name(&self, objects: &mut [IdentityObject]) {
        if let Some(order) = self.sort {
            objects.sort_by(|a, b| order.apply(compare_ignore_case(&a.name, &b.name)));
        }
    }

    /// Cuts the result window out of an already ordered list.
    #[must_use]
    pub fn apply_page<T>(&self, items: Vec<T>) -> Vec<T> {
        match self.page {
            Some(page) => {
                let take = if page.max_results == 0 {
                    usize::MAX
                } else {
                    page.max_results
                };
                items
                    .into_iter()
                    .skip(page.first_result)
                    .take(take)
                    .collect()
            }
            None => items,
        }
    }
}

impl SortOrder {
    /// Applies this order to an ascending comparison.
    #[must_use]
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// Case-insensitive comparison used for name sorting.
#[must_use]
pub fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Case-insensitive wildcard match where `*` matches any run of characters.
#[must_use]
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();

    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let mut rest = value.as_str();
    let first = parts[0];
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    let last = parts[parts.len() - 1];
    for middle in &parts[1..parts.len() - 1] {
        if middle.is_empty() {
            continue;
        }
        match rest.find(middle) {
            Some(idx) => rest = &rest[idx + middle.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}
