//! Raw transcript spans to caption chunks.
//!
//! Long spans are cut into groups of at most `max_words` words. Each group
//! gets a slice of the span proportional to its character length, laid out
//! back to back from the span start. Only the last slice takes the span's
//! own end time; interior boundaries are derived.

use reelcap_project_model::CaptionChunk;
use serde::{Deserialize, Serialize};

/// Word cap per caption chunk.
pub const DEFAULT_MAX_WORDS: usize = 4;

/// Span length assumed when the recognizer leaves the end open.
pub const OPEN_END_DEFAULT_SECS: f64 = 2.0;

/// A transcript span as reported by the speech recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    pub start: f64,
    /// `None` when the recognizer could not place the end.
    pub end: Option<f64>,
    pub text: String,
}

impl RawSpan {
    pub fn new(start: f64, end: Option<f64>, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// End time with the open-end default applied. Never before `start`.
    pub fn resolved_end(&self) -> f64 {
        self.end
            .unwrap_or(self.start + OPEN_END_DEFAULT_SECS)
            .max(self.start)
    }
}

/// Segment spans into chunks of at most `max_words` words.
///
/// Blank spans are dropped. A `max_words` of zero is treated as one.
pub fn segment(spans: &[RawSpan], max_words: usize) -> Vec<CaptionChunk> {
    let max_words = max_words.max(1);
    let mut chunks = Vec::with_capacity(spans.len());

    for span in spans {
        let words: Vec<&str> = span.text.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        let start = span.start.max(0.0);
        let end = span.resolved_end().max(start);

        if words.len() <= max_words {
            chunks.push(CaptionChunk::new(start, end, words.join(" ")));
            continue;
        }

        let total_chars = span.text.trim().chars().count() as f64;
        let total_duration = end - start;
        let groups: Vec<String> = words.chunks(max_words).map(|g| g.join(" ")).collect();
        let last = groups.len() - 1;

        let mut cursor = start;
        for (index, text) in groups.into_iter().enumerate() {
            let slice = (text.chars().count() as f64 / total_chars) * total_duration;
            let group_end = if index == last {
                end
            } else {
                (cursor + slice).min(end)
            };
            chunks.push(CaptionChunk::new(cursor, group_end, text));
            cursor = group_end;
        }
    }

    tracing::debug!(
        spans = spans.len(),
        chunks = chunks.len(),
        max_words,
        "Segmented transcript"
    );

    chunks
}
