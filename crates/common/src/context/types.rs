//! Chunk, hit and result types shared by the expansion engine and the
//! chunk store gateways.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Number of heading levels tracked for structured sources
pub const HEADING_LEVELS: usize = 6;

/// Metadata keys the markdown splitter writes heading text under
pub const HEADING_KEYS: [&str; HEADING_LEVELS] = [
    "Header 1", "Header 2", "Header 3", "Header 4", "Header 5", "Header 6",
];

/// Section headings a chunk sits under, level 1 first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingPath([Option<String>; HEADING_LEVELS]);

impl HeadingPath {
    /// Read heading levels out of chunk metadata
    pub fn from_metadata(metadata: &Value) -> Self {
        let mut path = Self::default();
        for (slot, key) in path.0.iter_mut().zip(HEADING_KEYS) {
            *slot = metadata
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned);
        }
        path
    }

    /// Set heading text at `level` (1-based)
    pub fn with_level(mut self, level: usize, text: impl Into<String>) -> Self {
        if let Some(slot) = level.checked_sub(1).and_then(|i| self.0.get_mut(i)) {
            *slot = Some(text.into());
        }
        self
    }

    /// Heading text at `level` (1-based)
    pub fn level(&self, level: usize) -> Option<&str> {
        level
            .checked_sub(1)
            .and_then(|i| self.0.get(i))
            .and_then(Option::as_deref)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// True when every level defined on `outer` is present here with the
    /// same text. Levels `outer` leaves undefined are unconstrained.
    pub fn sits_under(&self, outer: &HeadingPath) -> bool {
        self.0
            .iter()
            .zip(outer.0.iter())
            .all(|(mine, theirs)| match theirs {
                Some(expected) => mine.as_deref() == Some(expected.as_str()),
                None => true,
            })
    }
}

/// Markup of the document a chunk came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    #[default]
    Plain,
    Markdown,
}

impl SourceFormat {
    /// Infer the format from the source document name
    pub fn from_source(source: &str) -> Self {
        let lower = source.to_ascii_lowercase();
        if lower.ends_with(".md") || lower.ends_with(".markdown") {
            SourceFormat::Markdown
        } else {
            SourceFormat::Plain
        }
    }

    pub fn is_structured(self) -> bool {
        matches!(self, SourceFormat::Markdown)
    }
}

/// One stored unit of document text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Store-assigned, globally ordered identifier
    pub id: i64,

    /// Chunk text
    pub text: String,

    /// Owning source document name
    pub source: String,

    pub format: SourceFormat,

    pub headings: HeadingPath,

    /// Link back to the source, when the loader recorded one
    pub url: Option<String>,

    /// Raw per-chunk metadata
    pub metadata: Value,
}

impl Chunk {
    pub fn new(id: i64, source: impl Into<String>, text: impl Into<String>) -> Self {
        let source = source.into();
        Self {
            id,
            text: text.into(),
            format: SourceFormat::from_source(&source),
            source,
            headings: HeadingPath::default(),
            url: None,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_headings(mut self, headings: HeadingPath) -> Self {
        self.headings = headings;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Attach raw metadata; heading levels are re-read from it
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.headings = HeadingPath::from_metadata(&metadata);
        self.metadata = metadata;
        self
    }

    /// Length counted against the budget, in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_structured(&self) -> bool {
        self.format.is_structured()
    }
}

/// A chunk together with its distance to the current query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub chunk: Chunk,
    pub distance: Option<f32>,
}

impl Hit {
    pub fn new(chunk: Chunk, distance: f32) -> Self {
        Self {
            chunk,
            distance: Some(distance),
        }
    }

    pub fn without_distance(chunk: Chunk) -> Self {
        Self {
            chunk,
            distance: None,
        }
    }

    pub fn id(&self) -> i64 {
        self.chunk.id
    }
}

/// Equality filter over chunk metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFilter(BTreeMap<String, String>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Every pair must match a string value in `metadata`
    pub fn matches(&self, metadata: &Value) -> bool {
        self.iter()
            .all(|(key, value)| metadata.get(key).and_then(Value::as_str) == Some(value))
    }
}

impl From<BTreeMap<String, String>> for MetadataFilter {
    fn from(pairs: BTreeMap<String, String>) -> Self {
        Self(pairs)
    }
}

/// Smallest and largest chunk id in the whole collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBounds {
    pub min_id: i64,
    pub max_id: i64,
}

impl IdBounds {
    pub fn new(min_id: i64, max_id: i64) -> Self {
        Self { min_id, max_id }
    }
}

/// One stitched excerpt handed to the downstream consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    /// Chunk texts of the run, ascending id order, no separators added
    pub text: String,

    /// Representative distance, lower is more relevant
    pub score: f32,

    /// Source document of the run
    pub source: String,

    pub url: Option<String>,

    /// First and last chunk id of the run
    pub first_id: i64,
    pub last_id: i64,

    /// Seeds that landed inside this run
    pub seed_ids: Vec<i64>,

    /// Metadata of the best-scoring chunk in the run
    pub metadata: Value,
}

impl ResultDocument {
    /// Single-chunk document for a hit returned without expansion
    pub fn from_hit(hit: Hit) -> Self {
        let Hit { chunk, distance } = hit;
        Self {
            score: distance.unwrap_or(f32::MAX),
            first_id: chunk.id,
            last_id: chunk.id,
            seed_ids: vec![chunk.id],
            text: chunk.text,
            source: chunk.source,
            url: chunk.url,
            metadata: chunk.metadata,
        }
    }

    /// Number of chunks the document spans
    pub fn span(&self) -> usize {
        (self.last_id - self.first_id + 1) as usize
    }
}
