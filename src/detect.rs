use std::collections::HashMap;

use rayon::prelude::*;
use tracing::debug;

use crate::data::Layers;
use crate::matcher::{LookupResult, Matcher, Resolution, Strategy};
use crate::tokenizer::{TokenKind, Tokens};

/// A distinct word of a sentence together with its resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    surface_token: String,
    resolution: Resolution,
}

impl Match {
    /// The first occurrence of the word as written in the sentence.
    pub fn surface_token(&self) -> &str {
        &self.surface_token
    }

    pub fn matched_word(&self) -> &str {
        self.resolution.matched_word()
    }

    pub fn data(&self) -> &Layers {
        self.resolution.data()
    }

    pub fn strategy(&self) -> Strategy {
        self.resolution.strategy()
    }

    pub fn similarity(&self) -> u8 {
        self.resolution.similarity()
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }
}

/// One token of the analysed sentence, linked to its match when it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Index into [`Detection::matches`].
    pub match_index: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    sentence: String,
    matches: Vec<Match>,
    segments: Vec<Segment>,
}

impl Detection {
    pub fn sentence(&self) -> &str {
        &self.sentence
    }

    /// Matches in order of first occurrence, one per distinct word.
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The match for any occurrence of `token`, compared case-insensitively.
    pub fn match_for(&self, token: &str) -> Option<&Match> {
        let needle = token.trim().to_lowercase();
        self.matches
            .iter()
            .find(|candidate| candidate.surface_token.to_lowercase() == needle)
    }

    /// The match linked to `segment`, if any.
    pub fn match_at(&self, segment: &Segment) -> Option<&Match> {
        segment.match_index.and_then(|idx| self.matches.get(idx))
    }

    pub fn into_matches(self) -> Vec<Match> {
        self.matches
    }
}

/// Resolves every distinct word of `sentence` once and links each occurrence to the result.
pub fn detect(matcher: &Matcher<'_>, sentence: &str) -> Detection {
    if sentence.trim().is_empty() {
        return Detection {
            sentence: sentence.to_string(),
            ..Detection::default()
        };
    }

    let tokens: Vec<_> = Tokens::new(sentence).collect();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut distinct: Vec<&str> = Vec::new();
    let slots: Vec<Option<usize>> = tokens
        .iter()
        .map(|token| {
            if !token.is_word() {
                return None;
            }
            let slot = *seen.entry(token.text.to_lowercase()).or_insert_with(|| {
                distinct.push(token.text);
                distinct.len() - 1
            });
            Some(slot)
        })
        .collect();

    let results: Vec<LookupResult> = distinct
        .par_iter()
        .map(|word| matcher.resolve(word))
        .collect();

    let mut match_of_slot = vec![None; distinct.len()];
    let mut matches = Vec::new();
    for (slot, (word, result)) in distinct.iter().zip(results).enumerate() {
        if let LookupResult::Found(resolution) = result {
            match_of_slot[slot] = Some(matches.len());
            matches.push(Match {
                surface_token: (*word).to_string(),
                resolution,
            });
        }
    }
    debug!(
        tokens = tokens.len(),
        distinct = distinct.len(),
        matches = matches.len(),
        "detected dictionary words"
    );

    let segments = tokens
        .iter()
        .zip(slots)
        .map(|(token, slot)| Segment {
            kind: token.kind,
            text: token.text.to_string(),
            start: token.start,
            end: token.end,
            match_index: slot.and_then(|slot| match_of_slot[slot]),
        })
        .collect();

    Detection {
        sentence: sentence.to_string(),
        matches,
        segments,
    }
}
