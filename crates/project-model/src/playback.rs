//! Playback state shared by the preview, timeline, and export.

use serde::{Deserialize, Serialize};

/// Where playback is and how the source should be framed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Current playback time in seconds.
    pub current_time: f64,

    /// Clip duration in seconds.
    pub duration: f64,

    /// Whether the source video is taller than it is wide.
    pub is_vertical: bool,

    /// Horizontal crop offset, 0 (left) to 100 (right), used when a landscape
    /// source fills a vertical output.
    pub crop_value: f64,
}

impl PlaybackState {
    pub const DEFAULT_CROP: f64 = 50.0;

    pub fn new(duration: f64, source_width: u32, source_height: u32) -> Self {
        Self {
            current_time: 0.0,
            duration: duration.max(0.0),
            is_vertical: is_vertical_source(source_width, source_height),
            crop_value: Self::DEFAULT_CROP,
        }
    }

    /// Move the playhead, clamped to `[0, duration]`. Returns the new time.
    pub fn seek(&mut self, time_secs: f64) -> f64 {
        self.current_time = time_secs.clamp(0.0, self.duration);
        self.current_time
    }

    pub fn set_crop(&mut self, crop_value: f64) {
        self.crop_value = crop_value.clamp(0.0, 100.0);
    }
}

/// A source is vertical when its height exceeds its width.
pub fn is_vertical_source(width: u32, height: u32) -> bool {
    height > width
}
