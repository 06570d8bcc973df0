use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use fst::automaton::Str;
use fst::{Automaton, IntoStreamer, Map, MapBuilder, Streamer};
use once_cell::sync::Lazy;
use tracing::debug;
use zstd::stream::Decoder as ZstdDecoder;

use crate::data::{self, DictionaryEntry, DictionaryError, normalize_key};

static BUNDLED_JSON: &str = include_str!("../data/cdsf_sample.json");

static BUNDLED: Lazy<Arc<Dictionary>> = Lazy::new(|| {
    Arc::new(Dictionary::from_json_str(BUNDLED_JSON).expect("bundled dictionary is valid"))
});

/// The sample dictionary compiled into the crate.
pub fn bundled() -> Arc<Dictionary> {
    Arc::clone(&BUNDLED)
}

/// Failure reported by a dictionary collaborator while serving a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    Unavailable(String),
    Corrupt(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Unavailable(reason) => write!(f, "dictionary unavailable: {reason}"),
            SourceError::Corrupt(reason) => write!(f, "dictionary data is corrupt: {reason}"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Read-only view of a dictionary, keyed by lower-cased word.
pub trait DictionarySource: Send + Sync {
    /// Entry whose key equals `key` exactly. `key` is already lower-cased.
    fn get(&self, key: &str) -> Result<Option<Arc<DictionaryEntry>>, SourceError>;

    /// Entries whose key length in characters lies in `min_chars..=max_chars`, ordered by key.
    fn entries_by_len(
        &self,
        min_chars: usize,
        max_chars: usize,
    ) -> Result<Vec<Arc<DictionaryEntry>>, SourceError>;
}

/// In-memory dictionary with an fst index over its keys.
pub struct Dictionary {
    index: Map<Vec<u8>>,
    entries: Vec<Arc<DictionaryEntry>>,
    by_len: BTreeMap<usize, Vec<u32>>,
}

impl Dictionary {
    pub fn from_entries<I>(entries: I) -> Result<Self, DictionaryError>
    where
        I: IntoIterator<Item = DictionaryEntry>,
    {
        let mut sorted: Vec<DictionaryEntry> = entries.into_iter().collect();
        sorted.sort_by(|a, b| a.key().cmp(b.key()));
        for pair in sorted.windows(2) {
            if pair[0].key() == pair[1].key() {
                return Err(DictionaryError::DuplicateKey(pair[0].key().to_string()));
            }
        }

        let mut builder = MapBuilder::memory();
        let mut by_len: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
        for (position, entry) in sorted.iter().enumerate() {
            builder.insert(entry.key(), position as u64)?;
            by_len
                .entry(entry.key().chars().count())
                .or_default()
                .push(position as u32);
        }
        let index = Map::new(builder.into_inner()?)?;
        debug!(entries = sorted.len(), "built dictionary index");

        Ok(Self {
            index,
            entries: sorted.into_iter().map(Arc::new).collect(),
            by_len,
        })
    }

    /// Parses a `{ "word": { "layer": "detail" } }` document.
    pub fn from_json_str(text: &str) -> Result<Self, DictionaryError> {
        Self::from_entries(data::entries_from_object(text)?)
    }

    /// Loads a `.json` or `.jsonl` file, optionally zstd-compressed with a `.zst` suffix.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let path = path.as_ref();
        let mut raw = Vec::new();
        File::open(path)?.read_to_end(&mut raw)?;

        let mut name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if let Some(stripped) = name.strip_suffix(".zst") {
            let mut decoder = ZstdDecoder::new(Cursor::new(raw))?;
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            raw = decompressed;
            name = stripped.to_string();
        }

        let entries = if name.ends_with(".jsonl") {
            data::entries_from_lines(BufReader::new(Cursor::new(raw)))?
        } else {
            let text = String::from_utf8(raw).map_err(|err| {
                DictionaryError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
            })?;
            data::entries_from_object(&text)?
        };
        debug!(path = %path.display(), entries = entries.len(), "loaded dictionary file");
        Self::from_entries(entries)
    }

    /// Case-insensitive exact lookup.
    pub fn get(&self, word: &str) -> Option<&DictionaryEntry> {
        self.position(&normalize_key(word))
            .and_then(|position| self.entries.get(position))
            .map(Arc::as_ref)
    }

    /// Returns up to `limit` entries whose key starts with `prefix`, in key order.
    pub fn prefix(&self, prefix: &str, limit: usize) -> Vec<&DictionaryEntry> {
        let prefix = normalize_key(prefix);
        let automaton = Str::new(&prefix).starts_with();
        let mut stream = self.index.search(automaton).into_stream();
        let mut results = Vec::new();
        while let Some((_, position)) = stream.next() {
            if results.len() >= limit {
                break;
            }
            results.push(self.entries[position as usize].as_ref());
        }
        results
    }

    pub fn iter(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.entries.iter().map(|entry| entry.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).map(|value| value as usize)
    }
}

impl DictionarySource for Dictionary {
    fn get(&self, key: &str) -> Result<Option<Arc<DictionaryEntry>>, SourceError> {
        match self.position(key) {
            None => Ok(None),
            Some(position) => match self.entries.get(position) {
                Some(entry) => Ok(Some(Arc::clone(entry))),
                None => Err(SourceError::Corrupt(format!(
                    "index points past entry {position} for '{key}'"
                ))),
            },
        }
    }

    fn entries_by_len(
        &self,
        min_chars: usize,
        max_chars: usize,
    ) -> Result<Vec<Arc<DictionaryEntry>>, SourceError> {
        if min_chars > max_chars {
            return Ok(Vec::new());
        }
        let mut positions: Vec<u32> = self
            .by_len
            .range(min_chars..=max_chars)
            .flat_map(|(_, positions)| positions.iter().copied())
            .collect();
        positions.sort_unstable();
        Ok(positions
            .into_iter()
            .map(|position| Arc::clone(&self.entries[position as usize]))
            .collect())
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dictionary")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Layers;
    use std::io::Write;

    fn entry(word: &str) -> DictionaryEntry {
        let layers: Layers = [("Semantic", format!("meaning of {word}"))]
            .into_iter()
            .collect();
        DictionaryEntry::new(word, layers).expect("valid entry")
    }

    #[test]
    fn lookup_ignores_case() {
        let dict = Dictionary::from_entries([entry("Grace"), entry("hope")]).unwrap();
        assert_eq!(dict.get("GRACE").map(|e| e.word()), Some("Grace"));
        assert_eq!(dict.get("  hope ").map(|e| e.word()), Some("hope"));
        assert!(dict.get("virtue").is_none());
    }

    #[test]
    fn duplicate_keys_differing_by_case_are_rejected() {
        let err = Dictionary::from_entries([entry("Hope"), entry("hope")]).unwrap_err();
        assert!(matches!(err, DictionaryError::DuplicateKey(key) if key == "hope"));
    }

    #[test]
    fn dangling_index_position_is_corrupt() {
        let mut dict = Dictionary::from_entries([entry("grace"), entry("hope")]).unwrap();
        dict.entries.pop();
        assert!(matches!(
            DictionarySource::get(&dict, "hope"),
            Err(SourceError::Corrupt(_))
        ));
        assert!(DictionarySource::get(&dict, "grace").unwrap().is_some());
        assert!(dict.get("hope").is_none());
    }

    #[test]
    fn repeated_words_in_object_document_are_rejected() {
        let err = Dictionary::from_json_str(
            r#"{"grace": {"Semantic": "first"}, "Grace": {"Semantic": "second"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DictionaryError::DuplicateKey(key) if key == "grace"));
        let err = Dictionary::from_json_str(
            r#"{"hope": {"Semantic": "first"}, "hope": {"Semantic": "second"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DictionaryError::DuplicateKey(key) if key == "hope"));
    }

    #[test]
    fn prefix_returns_sorted_and_limited() {
        let dict = Dictionary::from_entries([
            entry("salvage"),
            entry("salt"),
            entry("salvation"),
            entry("grace"),
        ])
        .unwrap();
        let words: Vec<_> = dict.prefix("Sal", 2).iter().map(|e| e.word()).collect();
        assert_eq!(words, ["salt", "salvage"]);
        assert!(dict.prefix("x", 5).is_empty());
    }

    #[test]
    fn entries_by_len_filters_on_character_count() {
        let dict =
            Dictionary::from_entries([entry("hope"), entry("grace"), entry("naïve"), entry("sv")])
                .unwrap();
        let keys: Vec<String> = DictionarySource::entries_by_len(&dict, 5, 5)
            .unwrap()
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(keys, ["grace", "naïve"]);
        assert!(DictionarySource::entries_by_len(&dict, 6, 5).unwrap().is_empty());
    }

    #[test]
    fn bundled_dictionary_loads() {
        let dict = bundled();
        assert!(!dict.is_empty());
        assert!(dict.get("grace").is_some());
        assert!(dict.get("salvage").is_some());
    }

    #[test]
    fn loads_compressed_line_files() {
        let dir = std::env::temp_dir().join(format!("cdsf-gloss-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("words.jsonl.zst");
        let body = concat!(
            "{\"word\": \"Virtue\", \"layers\": {\"Semantic\": \"moral excellence\"}}\n",
            "{\"word\": \"hope\", \"layers\": {\"Semantic\": \"expectation\"}}\n",
        );
        let compressed = zstd::stream::encode_all(Cursor::new(body.as_bytes()), 3).unwrap();
        File::create(&path).unwrap().write_all(&compressed).unwrap();

        let dict = Dictionary::from_path(&path).unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(
            dict.get("virtue").and_then(|e| e.layers().get("semantic")),
            Some("moral excellence")
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
