//! Clock and timing utilities for the export capture loop.
//!
//! Export frames are sampled on a fixed-rate clock. This module provides:
//! - Frame index <-> media time conversion
//! - A wall clock anchored at export start (for ETA and pacing checks)
//! - Drift measurement between wall time and media time

use std::time::{Duration, Instant};

/// Fixed-rate frame clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock ticking at `fps` frames per second (minimum 1).
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    /// Frames per second.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Interval between two ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps as u64)
    }

    /// Media time of the given frame index, in seconds.
    pub fn frame_time(&self, index: u64) -> f64 {
        index as f64 / self.fps as f64
    }

    /// Number of frames needed to cover `duration_secs`.
    pub fn total_frames(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 || !duration_secs.is_finite() {
            return 0;
        }
        (duration_secs * self.fps as f64).ceil() as u64
    }
}

/// Wall clock anchored at the moment an export started.
#[derive(Debug, Clone)]
pub struct ExportClock {
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl ExportClock {
    /// Create a clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Nanoseconds elapsed since start.
    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Seconds elapsed since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// Estimated seconds remaining given a progress fraction in `[0, 1]`.
    pub fn eta_secs(&self, progress: f64) -> f64 {
        if progress <= 0.0 {
            return 0.0;
        }
        let elapsed = self.elapsed_secs();
        ((elapsed / progress.min(1.0)) - elapsed).max(0.0)
    }

    /// Convert seconds to nanoseconds.
    pub fn secs_to_ns(secs: f64) -> u64 {
        (secs.max(0.0) * 1_000_000_000.0) as u64
    }
}

/// Drift between a reference timeline and a measured one.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}
