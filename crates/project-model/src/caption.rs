//! Caption chunks and the ordered track that owns them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Shortest span any edit may leave a chunk with, in seconds.
pub const MIN_CHUNK_DURATION_SECS: f64 = 0.2;

static NEXT_CHUNK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique chunk identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Mint a fresh identifier.
    pub fn mint() -> Self {
        Self(NEXT_CHUNK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Make sure ids loaded from disk are never minted again.
    ///
    /// The top id is skipped; project loading rejects it before it gets here.
    fn reserve(id: ChunkId) {
        if id.is_reservable() {
            NEXT_CHUNK_ID.fetch_max(id.0 + 1, Ordering::Relaxed);
        }
    }

    /// Ids at the top of the range would leave nothing to mint after them.
    pub fn is_reservable(&self) -> bool {
        self.0 < u64::MAX
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A timed caption span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionChunk {
    pub id: ChunkId,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    pub text: String,
}

impl CaptionChunk {
    /// Create a chunk with a freshly minted id.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            id: ChunkId::mint(),
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Inclusive on both ends.
    pub fn contains(&self, time_secs: f64) -> bool {
        time_secs >= self.start && time_secs <= self.end
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Clamp a span so that `start >= 0` and `end >= start + MIN_CHUNK_DURATION_SECS`.
pub fn clamp_span(start: f64, end: f64) -> (f64, f64) {
    let start = start.max(0.0);
    let end = end.max(start + MIN_CHUNK_DURATION_SECS);
    (start, end)
}

/// The ordered caption list for one editing session.
///
/// Chunks may overlap after manual edits; lookups resolve overlaps by list
/// order. Every per-chunk mutator enforces the minimum duration. Wholesale
/// replacement takes the chunks as given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptionTrack {
    chunks: Vec<CaptionChunk>,
}

impl CaptionTrack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: Vec<CaptionChunk>) -> Self {
        let mut track = Self::new();
        track.replace_all(chunks);
        track
    }

    /// Rebuild a track read from disk. Blank chunks are dropped; negative
    /// starts move to 0 and empty or inverted spans get the minimum duration.
    pub fn from_saved(chunks: Vec<CaptionChunk>) -> Self {
        let chunks = chunks
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .map(|mut chunk| {
                chunk.start = chunk.start.max(0.0);
                if !(chunk.end > chunk.start) {
                    chunk.end = chunk.start + MIN_CHUNK_DURATION_SECS;
                }
                chunk
            })
            .collect();
        Self::from_chunks(chunks)
    }

    /// Replace every chunk (new source video or new transcription pass).
    pub fn replace_all(&mut self, chunks: Vec<CaptionChunk>) {
        for chunk in &chunks {
            ChunkId::reserve(chunk.id);
        }
        self.chunks = chunks;
    }

    pub fn chunks(&self) -> &[CaptionChunk] {
        &self.chunks
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptionChunk> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: ChunkId) -> Option<&CaptionChunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    pub fn position(&self, id: ChunkId) -> Option<usize> {
        self.chunks.iter().position(|c| c.id == id)
    }

    /// Replace a chunk's text. Blank text is rejected.
    pub fn edit_text(&mut self, id: ChunkId, text: impl Into<String>) -> bool {
        let text = text.into();
        if text.trim().is_empty() {
            return false;
        }
        match self.chunks.iter_mut().find(|c| c.id == id) {
            Some(chunk) => {
                chunk.text = text;
                true
            }
            None => false,
        }
    }

    /// Move a chunk's span, clamped to the span invariants.
    ///
    /// Returns the committed chunk, or `None` if the id is unknown.
    pub fn set_timing(&mut self, id: ChunkId, start: f64, end: f64) -> Option<&CaptionChunk> {
        let (start, end) = clamp_span(start, end);
        let chunk = self.chunks.iter_mut().find(|c| c.id == id)?;
        chunk.start = start;
        chunk.end = end;
        Some(chunk)
    }

    /// Commit a span computed by an in-progress timeline drag.
    ///
    /// Same clamping as [`set_timing`](Self::set_timing); returns `false` if
    /// the chunk no longer exists (the track was replaced mid-drag).
    pub fn update_from_drag(&mut self, id: ChunkId, start: f64, end: f64) -> bool {
        self.set_timing(id, start, end).is_some()
    }
}
