//! Include/exclude filtering of relative paths.
//!
//! Patterns are case-insensitive and anchored to the whole relative path.
//! `*` matches any run of characters, `/` included, and `?` matches exactly
//! one character. Brackets and braces are matched literally.

use crate::utils::errors::{RestoreError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// A filter that lets every path through
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Include list first (empty means everything), then exclude list.
    pub fn matches(&self, relative_path: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(relative_path) {
                return false;
            }
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(relative_path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    let patterns: Vec<&String> = patterns.iter().filter(|p| !p.trim().is_empty()).collect();
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&escape_classes(pattern.trim()))
            .case_insensitive(true)
            .literal_separator(false)
            .backslash_escape(false)
            .build()
            .map_err(|e| {
                RestoreError::Configuration(format!("invalid file pattern {:?}: {}", pattern, e))
            })?;
        builder.add(glob);
    }

    let set = builder
        .build()
        .map_err(|e| RestoreError::Configuration(format!("invalid file patterns: {}", e)))?;
    Ok(Some(set))
}

/// Only `*` and `?` are wildcards; every other glob metacharacter is literal.
fn escape_classes(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '[' | ']' | '{' | '}' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}
