//! reelcap processing core
//!
//! Turns transcript spans into captions and keeps them editable:
//! - **Segmenter:** Split raw ASR spans into short, readably-paced chunks
//! - **Timing:** Resolve the caption active at a playback time
//! - **Timeline:** Scrub and drag/resize gestures on the caption time axis
//!
//! This crate is pure computation: no I/O, no platform dependencies.
//! All inputs are data; all outputs are data.

pub mod segmenter;
pub mod timeline;
pub mod timing;

pub use segmenter::{segment, RawSpan, DEFAULT_MAX_WORDS};
pub use timeline::{TimelineAction, TimelineModel, TrackView};
pub use timing::{active_chunk, ActiveCaptionTracker};
