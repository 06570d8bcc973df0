use std::fmt;
use std::sync::Arc;

use rapidfuzz::distance::levenshtein;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::{DictionaryEntry, Layers, normalize_key};
use crate::dictionary::{DictionarySource, SourceError};

/// Suffix rewrites tried before edit distance. The closest existing base wins.
const INFLECTIONS: &[(&str, &str)] = &[
    ("ies", "y"),
    ("ing", ""),
    ("ed", ""),
    ("es", ""),
    ("s", ""),
    ("ly", ""),
];
const MIN_STEM_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchConfig {
    /// Tokens shorter than this (in characters) only resolve by exact match.
    pub min_fuzzy_len: usize,
    pub max_edit_distance: usize,
    pub strip_inflections: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            min_fuzzy_len: 4,
            max_edit_distance: 1,
            strip_inflections: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exact,
    Inflection,
    EditDistance,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Exact => write!(f, "exact"),
            Strategy::Inflection => write!(f, "inflection"),
            Strategy::EditDistance => write!(f, "edit distance"),
        }
    }
}

/// A token bound to the dictionary entry it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    entry: Arc<DictionaryEntry>,
    strategy: Strategy,
    similarity: u8,
}

impl Resolution {
    fn new(entry: Arc<DictionaryEntry>, strategy: Strategy, similarity: u8) -> Self {
        Self {
            entry,
            strategy,
            similarity,
        }
    }

    /// Canonical dictionary word.
    pub fn matched_word(&self) -> &str {
        self.entry.word()
    }

    pub fn data(&self) -> &Layers {
        self.entry.layers()
    }

    pub fn entry(&self) -> &DictionaryEntry {
        &self.entry
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// 0-100, where 100 is an exact match.
    pub fn similarity(&self) -> u8 {
        self.similarity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    NotFound,
    DataSourceUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl LookupFailure {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InvalidInput,
            message: message.into(),
        }
    }

    pub fn not_found(word: &str) -> Self {
        Self {
            kind: FailureKind::NotFound,
            message: format!("Word '{word}' not found in the dictionary."),
        }
    }

    pub fn unavailable(err: &SourceError) -> Self {
        Self {
            kind: FailureKind::DataSourceUnavailable,
            message: format!("The dictionary could not be consulted ({err}). Please try again."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Found(Resolution),
    Missing(LookupFailure),
}

impl LookupResult {
    pub fn found(&self) -> bool {
        matches!(self, LookupResult::Found(_))
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            LookupResult::Found(resolution) => Some(resolution),
            LookupResult::Missing(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&LookupFailure> {
        match self {
            LookupResult::Found(_) => None,
            LookupResult::Missing(failure) => Some(failure),
        }
    }

    pub fn data(&self) -> Option<&Layers> {
        self.resolution().map(Resolution::data)
    }

    pub fn message(&self) -> Option<&str> {
        self.failure().map(|failure| failure.message.as_str())
    }
}

/// Resolves single tokens against a dictionary: exact, then inflection, then edit distance.
#[derive(Clone, Copy)]
pub struct Matcher<'a> {
    source: &'a dyn DictionarySource,
    config: &'a MatchConfig,
}

impl<'a> Matcher<'a> {
    pub fn new(source: &'a dyn DictionarySource, config: &'a MatchConfig) -> Self {
        Self { source, config }
    }

    pub fn resolve(&self, token: &str) -> LookupResult {
        let token = token.trim();
        if token.is_empty() {
            return LookupResult::Missing(LookupFailure::invalid_input(
                "Cannot resolve an empty word.",
            ));
        }
        match self.try_resolve(&normalize_key(token)) {
            Ok(Some(resolution)) => LookupResult::Found(resolution),
            Ok(None) => LookupResult::Missing(LookupFailure::not_found(token)),
            Err(err) => {
                warn!(word = token, error = %err, "dictionary lookup failed");
                LookupResult::Missing(LookupFailure::unavailable(&err))
            }
        }
    }

    fn try_resolve(&self, key: &str) -> Result<Option<Resolution>, SourceError> {
        if let Some(entry) = self.source.get(key)? {
            return Ok(Some(Resolution::new(entry, Strategy::Exact, 100)));
        }
        let key_chars = key.chars().count();
        if key_chars < self.config.min_fuzzy_len {
            return Ok(None);
        }
        if self.config.strip_inflections {
            if let Some(resolution) = self.resolve_inflection(key)? {
                debug!(token = key, matched = resolution.matched_word(), "inflection match");
                return Ok(Some(resolution));
            }
        }
        let nearest = self.resolve_nearest(key, key_chars)?;
        if let Some(resolution) = &nearest {
            debug!(token = key, matched = resolution.matched_word(), "edit distance match");
        }
        Ok(nearest)
    }

    fn resolve_inflection(&self, key: &str) -> Result<Option<Resolution>, SourceError> {
        let mut bases: Vec<String> = Vec::new();
        for (suffix, replacement) in INFLECTIONS {
            let Some(stem) = key.strip_suffix(suffix) else {
                continue;
            };
            if stem.chars().count() < MIN_STEM_CHARS {
                continue;
            }
            bases.push(format!("{stem}{replacement}"));
            if replacement.is_empty() {
                bases.push(format!("{stem}e"));
            }
        }
        bases.sort();
        bases.dedup();

        let mut best: Option<(usize, Arc<DictionaryEntry>)> = None;
        for base in &bases {
            let Some(entry) = self.source.get(base)? else {
                continue;
            };
            let distance = levenshtein::distance(key.chars(), entry.key().chars());
            let closer = match &best {
                None => true,
                Some((best_distance, current)) => {
                    (distance, entry.key()) < (*best_distance, current.key())
                }
            };
            if closer {
                best = Some((distance, entry));
            }
        }

        Ok(best.map(|(_, entry)| {
            let score = similarity(key, entry.key());
            Resolution::new(entry, Strategy::Inflection, score)
        }))
    }

    fn resolve_nearest(
        &self,
        key: &str,
        key_chars: usize,
    ) -> Result<Option<Resolution>, SourceError> {
        let max = self.config.max_edit_distance;
        if max == 0 {
            return Ok(None);
        }
        let candidates = self
            .source
            .entries_by_len(key_chars.saturating_sub(max), key_chars.saturating_add(max))?;

        let mut best: Option<(usize, Arc<DictionaryEntry>)> = None;
        for candidate in candidates {
            let distance = levenshtein::distance(key.chars(), candidate.key().chars());
            if distance > max {
                continue;
            }
            let closer = match &best {
                None => true,
                Some((best_distance, current)) => {
                    (distance, candidate.key()) < (*best_distance, current.key())
                }
            };
            if closer {
                best = Some((distance, candidate));
            }
        }

        Ok(best.map(|(_, entry)| {
            let score = similarity(key, entry.key());
            Resolution::new(entry, Strategy::EditDistance, score)
        }))
    }
}

/// Normalized Levenshtein similarity on a 0-100 scale.
fn similarity(a: &str, b: &str) -> u8 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100;
    }
    let distance = levenshtein::distance(a.chars(), b.chars()).min(longest);
    (((longest - distance) * 100 + longest / 2) / longest) as u8
}
