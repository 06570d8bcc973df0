use std::fmt;
use std::io::BufRead;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Ordered CDSF layers of one entry: layer name to detail text, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layers(Vec<(String, String)>);

impl Layers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, detail: impl Into<String>) {
        self.0.push((name.into(), detail.into()));
    }

    /// Detail text for a layer, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(layer, _)| layer.eq_ignore_ascii_case(name))
            .map(|(_, detail)| detail.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, detail)| (name.as_str(), detail.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<N, D> FromIterator<(N, D)> for Layers
where
    N: Into<String>,
    D: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, D)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, detail)| (name.into(), detail.into()))
                .collect(),
        )
    }
}

impl Serialize for Layers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, detail) in &self.0 {
            map.serialize_entry(name, detail)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Layers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LayersVisitor;

        impl<'de> Visitor<'de> for LayersVisitor {
            type Value = Layers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of layer names to detail text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Layers, A::Error> {
                let mut layers = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, detail)) = access.next_entry::<String, String>()? {
                    layers.push((name, detail));
                }
                Ok(Layers(layers))
            }
        }

        deserializer.deserialize_map(LayersVisitor)
    }
}

/// One dictionary word with its annotation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryEntry {
    word: String,
    key: String,
    layers: Layers,
}

impl DictionaryEntry {
    pub fn new(word: impl Into<String>, layers: Layers) -> Result<Self, DictionaryError> {
        let word: String = word.into();
        let word = word.trim();
        if word.is_empty() {
            return Err(DictionaryError::EmptyWord);
        }
        Ok(Self {
            key: normalize_key(word),
            word: word.to_string(),
            layers,
        })
    }

    /// The word as stored in the dictionary.
    pub fn word(&self) -> &str {
        &self.word
    }

    /// Lower-cased lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }
}

pub fn normalize_key(word: &str) -> String {
    word.trim().to_lowercase()
}

#[derive(Debug)]
pub enum DictionaryError {
    Io(std::io::Error),
    Json {
        line: Option<usize>,
        source: serde_json::Error,
    },
    MalformedLayers {
        word: String,
        reason: String,
    },
    DuplicateKey(String),
    EmptyWord,
    Index(fst::Error),
}

impl fmt::Display for DictionaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictionaryError::Io(err) => write!(f, "io error: {err}"),
            DictionaryError::Json {
                line: Some(line),
                source,
            } => write!(f, "invalid JSON on line {line}: {source}"),
            DictionaryError::Json { line: None, source } => write!(f, "invalid JSON: {source}"),
            DictionaryError::MalformedLayers { word, reason } => {
                write!(f, "malformed layers for {word:?}: {reason}")
            }
            DictionaryError::DuplicateKey(key) => write!(f, "duplicate dictionary word {key:?}"),
            DictionaryError::EmptyWord => write!(f, "dictionary entry has an empty word"),
            DictionaryError::Index(err) => write!(f, "failed to build word index: {err}"),
        }
    }
}

impl std::error::Error for DictionaryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DictionaryError::Io(err) => Some(err),
            DictionaryError::Json { source, .. } => Some(source),
            DictionaryError::Index(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DictionaryError {
    fn from(value: std::io::Error) -> Self {
        DictionaryError::Io(value)
    }
}

impl From<fst::Error> for DictionaryError {
    fn from(value: fst::Error) -> Self {
        DictionaryError::Index(value)
    }
}

impl From<serde_json::Error> for DictionaryError {
    fn from(value: serde_json::Error) -> Self {
        DictionaryError::Json {
            line: None,
            source: value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EntryLine {
    word: String,
    #[serde(default)]
    layers: Value,
}

/// Top-level words of an object document, in order and with repeats kept.
struct WordObjects(Vec<(String, Value)>);

impl<'de> Deserialize<'de> for WordObjects {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WordsVisitor;

        impl<'de> Visitor<'de> for WordsVisitor {
            type Value = WordObjects;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a top-level object of words")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<WordObjects, A::Error> {
                let mut words = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((word, layers)) = access.next_entry::<String, Value>()? {
                    words.push((word, layers));
                }
                Ok(WordObjects(words))
            }
        }

        deserializer.deserialize_map(WordsVisitor)
    }
}

/// Parses a `{ "word": { "layer": "detail", ... }, ... }` document.
pub(crate) fn entries_from_object(text: &str) -> Result<Vec<DictionaryEntry>, DictionaryError> {
    let WordObjects(words) = serde_json::from_str(text)?;
    words
        .into_iter()
        .map(|(word, layers)| {
            let layers = layers_from_value(&word, layers)?;
            DictionaryEntry::new(word, layers)
        })
        .collect()
}

/// Parses one `{"word": ..., "layers": {...}}` object per line; blank lines are skipped.
pub(crate) fn entries_from_lines<R: BufRead>(
    reader: R,
) -> Result<Vec<DictionaryEntry>, DictionaryError> {
    let mut entries = Vec::new();
    for (idx, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        if line.trim().is_empty() {
            continue;
        }
        let row: EntryLine = serde_json::from_str(&line).map_err(|source| DictionaryError::Json {
            line: Some(idx + 1),
            source,
        })?;
        let layers = layers_from_value(&row.word, row.layers)?;
        entries.push(DictionaryEntry::new(row.word, layers)?);
    }
    Ok(entries)
}

fn layers_from_value(word: &str, value: Value) -> Result<Layers, DictionaryError> {
    let malformed = |reason: String| DictionaryError::MalformedLayers {
        word: word.to_string(),
        reason,
    };
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(malformed(format!(
                "expected an object of layers, found {}",
                json_kind(&other)
            )));
        }
    };
    let mut layers = Layers::new();
    for (name, detail) in map {
        match detail {
            Value::String(text) => layers.push(name, text),
            other => {
                return Err(malformed(format!(
                    "layer {name:?} must be text, found {}",
                    json_kind(&other)
                )));
            }
        }
    }
    Ok(layers)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
