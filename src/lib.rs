mod data;
mod detect;
mod dictionary;
mod matcher;
pub mod tokenizer;
#[cfg(feature = "web")]
pub mod web;

use std::fmt;
use std::sync::Arc;

pub use data::{DictionaryEntry, DictionaryError, Layers};
pub use detect::{Detection, Match, Segment};
pub use dictionary::{Dictionary, DictionarySource, SourceError, bundled};
pub use matcher::{
    FailureKind, LookupFailure, LookupResult, MatchConfig, Matcher, Resolution, Strategy,
};

/// Entry point for word lookups and sentence detection over one dictionary.
///
/// Cloning is cheap; the dictionary is shared.
#[derive(Clone)]
pub struct Annotator {
    source: Arc<dyn DictionarySource>,
    config: MatchConfig,
}

impl Annotator {
    pub fn new(source: Arc<dyn DictionarySource>, config: MatchConfig) -> Self {
        Self { source, config }
    }

    /// Annotator over the bundled sample dictionary with default matching.
    pub fn bundled() -> Self {
        Self::new(dictionary::bundled(), MatchConfig::default())
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn DictionarySource {
        self.source.as_ref()
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(self.source.as_ref(), &self.config)
    }

    /// Resolves one word, trimmed. Blank input is rejected before the dictionary is consulted.
    pub fn lookup(&self, word: &str) -> LookupResult {
        let word = word.trim();
        if word.is_empty() {
            return LookupResult::Missing(LookupFailure::invalid_input(
                "Please enter a word to look up.",
            ));
        }
        self.matcher().resolve(word)
    }

    /// Finds the dictionary words of a free-form sentence.
    pub fn detect(&self, sentence: &str) -> Detection {
        detect::detect(&self.matcher(), sentence)
    }
}

impl fmt::Debug for Annotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annotator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: Arc<Dictionary>,
        calls: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                inner: bundled(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DictionarySource for CountingSource {
        fn get(&self, key: &str) -> Result<Option<Arc<DictionaryEntry>>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DictionarySource::get(self.inner.as_ref(), key)
        }

        fn entries_by_len(
            &self,
            min_chars: usize,
            max_chars: usize,
        ) -> Result<Vec<Arc<DictionaryEntry>>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.entries_by_len(min_chars, max_chars)
        }
    }

    #[test]
    fn lookup_ignores_case() {
        let annotator = Annotator::bundled();
        let upper = annotator.lookup("Grace");
        let lower = annotator.lookup("grace");
        assert!(upper.found());
        assert_eq!(upper.data(), lower.data());
        assert_eq!(upper.resolution().unwrap().matched_word(), "grace");
    }

    #[test]
    fn lookup_trims_input() {
        let annotator = Annotator::bundled();
        assert!(annotator.lookup("  virtue\n").found());
    }

    #[test]
    fn lookup_falls_back_to_fuzzy_match() {
        let annotator = Annotator::bundled();
        let result = annotator.lookup("salvag");
        let resolution = result.resolution().expect("fuzzy match");
        assert_eq!(resolution.matched_word(), "salvage");
        assert_eq!(resolution.strategy(), Strategy::EditDistance);

        let short = annotator.lookup("sv");
        assert!(!short.found());
    }

    #[test]
    fn unknown_word_reports_a_message() {
        let annotator = Annotator::bundled();
        let result = annotator.lookup("zzzzqx");
        let failure = result.failure().expect("not found");
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert!(failure.message.contains("zzzzqx"));
    }

    #[test]
    fn blank_input_never_reaches_the_dictionary() {
        let source = Arc::new(CountingSource::new());
        let annotator = Annotator::new(source.clone(), MatchConfig::default());

        for word in ["", "   "] {
            let result = annotator.lookup(word);
            assert_eq!(result.failure().unwrap().kind, FailureKind::InvalidInput);
        }
        assert!(annotator.detect("").is_empty());
        assert!(annotator.detect(" \t ").segments().is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);

        annotator.lookup("grace");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detect_resolves_each_distinct_word_once() {
        let source = Arc::new(CountingSource::new());
        let annotator = Annotator::new(source.clone(), MatchConfig::default());
        let detection = annotator.detect("hope Hope HOPE hope");
        assert_eq!(detection.matches().len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(detection.matches()[0].surface_token(), "hope");
    }

    #[test]
    fn detect_collapses_repeated_words() {
        let annotator = Annotator::bundled();
        let detection = annotator.detect("The grace and virtue of the Grace inspired hope.");
        let grace: Vec<_> = detection
            .matches()
            .iter()
            .filter(|m| m.matched_word() == "grace")
            .collect();
        assert_eq!(grace.len(), 1);
        let first = detection.match_for("grace").unwrap();
        let second = detection.match_for("Grace").unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(
            detection.matches().iter().map(Match::matched_word).collect::<Vec<_>>(),
            ["grace", "virtue", "inspire", "hope"]
        );
    }

    #[test]
    fn detect_is_idempotent() {
        let annotator = Annotator::bundled();
        let sentence = "A knight's courage, faith and mercy; a knight's honour.";
        assert_eq!(annotator.detect(sentence), annotator.detect(sentence));
    }
}
