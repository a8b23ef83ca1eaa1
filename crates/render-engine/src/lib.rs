//! reelcap render engine
//!
//! Draws captioned frames and turns a playing clip into an encoded video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source.mp4 ── VideoSource (muted, t=0) ──┐
//!                                          ├── FrameCompositor ── FrameRecorder (VP8 WebM)
//! captions + style + crop ─────────────────┘                             │
//!                                                                        ▼
//! source.mp4 (original audio bytes) ─────────────────────────── EncoderWorker (isolated)
//!                                                                        │
//!                                                       MP4 (H.264/AAC) or WebM fallback
//! ```

pub mod compositor;
pub mod export;
pub mod ffmpeg;
pub mod surface;

pub use compositor::{caption_layout, render, video_placement, wrap_lines, CaptionLayout, FrameParams};
pub use export::*;
pub use surface::{DisplayList, DrawOp, FontBook, RasterSurface, Shadow, Surface, VideoFrame};
