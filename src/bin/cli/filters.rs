//! Filtering logic for translation output
//!
//! Selects modifiers by name with `*` wildcards.

use anyhow::{Context, Result};
use regex::Regex;

/// Compiled `--only` pattern, matched against full modifier names
#[derive(Debug, Clone)]
pub struct NameFilter {
    regex: Regex,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body))
            .with_context(|| format!("invalid name pattern `{}`", pattern))?;
        Ok(NameFilter { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Keep the items whose name matches `filter`, or all of them without one
pub fn filter_by_name<T>(items: Vec<T>, filter: Option<&NameFilter>, name: impl Fn(&T) -> &str) -> Vec<T> {
    match filter {
        Some(filter) => items.into_iter().filter(|item| filter.matches(name(item))).collect(),
        None => items,
    }
}
