//! Tag inference for distribution paths.
//!
//! Tags are short canonical terms (`console-cores`, `bios`, `arcade-jt1942`, ...)
//! interned into a run-scoped dictionary of small integer ids.

pub mod dates;
pub mod engine;
pub mod metadata;
pub mod xml;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{Error, Result};

pub use engine::{TagEngine, DEFAULT_ALIASES};
pub use metadata::Metadata;

/// Id of a canonical term inside one run's tag dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(pub u32);

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw term after cleaning: `report` keeps `-`/`_` for the human listing,
/// `canonical` is the dictionary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanTerm {
    pub report: String,
    pub canonical: String,
}

/// Lowercases, drops everything outside `[-_a-z0-9.]`, then drops `-` and `_`.
pub fn clean_term(raw: &str) -> Result<CleanTerm> {
    let report: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
        .collect();
    let canonical: String = report.chars().filter(|c| !matches!(c, '-' | '_')).collect();
    if canonical.is_empty() {
        return Err(Error::EmptyTerm(raw.to_string()));
    }
    Ok(CleanTerm { report, canonical })
}

/// Canonical term -> id, allocated in first-use order.
#[derive(Debug, Default)]
pub struct TagDictionary {
    ids: BTreeMap<String, TagId>,
    next: u32,
    used: BTreeSet<TagId>,
    report_terms: BTreeSet<String>,
}

impl TagDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every member of `group` resolve to one id. Reuses the id a member
    /// already has; two members with different ids is a configuration error.
    pub fn merge_aliases<S: AsRef<str>>(&mut self, group: &[S]) -> Result<()> {
        let mut terms = Vec::with_capacity(group.len());
        for raw in group {
            terms.push(self.clean(raw.as_ref())?);
        }

        let mut existing: Option<TagId> = None;
        for term in &terms {
            if let Some(&id) = self.ids.get(term) {
                match existing {
                    None => existing = Some(id),
                    Some(previous) if previous != id => {
                        return Err(Error::AliasConflict(previous, id));
                    }
                    Some(_) => {}
                }
            }
        }

        let id = existing.unwrap_or_else(|| self.allocate());
        for term in terms {
            self.ids.insert(term, id);
        }
        Ok(())
    }

    /// Interns a raw term and marks its id as referenced.
    pub fn use_term(&mut self, raw: &str) -> Result<TagId> {
        let canonical = self.clean(raw)?;
        let id = match self.ids.get(&canonical) {
            Some(&id) => id,
            None => {
                let id = self.allocate();
                self.ids.insert(canonical, id);
                id
            }
        };
        self.used.insert(id);
        Ok(id)
    }

    pub fn get(&self, raw: &str) -> Option<TagId> {
        let term = clean_term(raw).ok()?;
        self.ids.get(&term.canonical).copied()
    }

    /// The published dictionary: only terms whose id some file or folder references.
    pub fn dictionary(&self) -> BTreeMap<String, TagId> {
        self.ids
            .iter()
            .filter(|(_, id)| self.used.contains(id))
            .map(|(term, id)| (term.clone(), *id))
            .collect()
    }

    /// Cleaned terms (with `-`/`_` kept) whose id ended up referenced, sorted.
    pub fn report_terms(&self) -> Vec<String> {
        self.report_terms
            .iter()
            .filter(|report| {
                clean_term(report)
                    .ok()
                    .and_then(|term| self.ids.get(&term.canonical))
                    .map_or(false, |id| self.used.contains(id))
            })
            .cloned()
            .collect()
    }

    fn clean(&mut self, raw: &str) -> Result<String> {
        let term = clean_term(raw)?;
        self.report_terms.insert(term.report);
        Ok(term.canonical)
    }

    fn allocate(&mut self) -> TagId {
        let id = TagId(self.next);
        self.next += 1;
        id
    }
}
