//! Output geometry and pixel rectangles.
//!
//! Exactly two aspect presets are supported. Each has a fixed export
//! resolution and an independently sized preview resolution; rendering
//! scales everything off the geometry width so either works.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output aspect preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AspectPreset {
    /// 9:16 (shorts/reels).
    #[default]
    Vertical,
    /// 16:9.
    Horizontal,
}

impl AspectPreset {
    pub fn is_vertical(&self) -> bool {
        matches!(self, AspectPreset::Vertical)
    }

    /// Resolution used for export.
    pub fn export_geometry(&self) -> OutputGeometry {
        match self {
            AspectPreset::Vertical => OutputGeometry::new(720, 1280),
            AspectPreset::Horizontal => OutputGeometry::new(1280, 720),
        }
    }

    /// Resolution used for the interactive preview.
    pub fn preview_geometry(&self) -> OutputGeometry {
        match self {
            AspectPreset::Vertical => OutputGeometry::new(320, 568),
            AspectPreset::Horizontal => OutputGeometry::new(560, 315),
        }
    }
}

impl fmt::Display for AspectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectPreset::Vertical => f.write_str("vertical"),
            AspectPreset::Horizontal => f.write_str("horizontal"),
        }
    }
}

impl FromStr for AspectPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertical" | "9:16" | "portrait" => Ok(AspectPreset::Vertical),
            "horizontal" | "16:9" | "landscape" => Ok(AspectPreset::Horizontal),
            other => Err(format!(
                "Unknown output format: {other}. Use: vertical (9:16), horizontal (16:9)"
            )),
        }
    }
}

/// Pixel dimensions of a drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputGeometry {
    pub width: u32,
    pub height: u32,
}

impl OutputGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn is_vertical(&self) -> bool {
        self.height > self.width
    }

    pub fn width_f(&self) -> f64 {
        self.width as f64
    }

    pub fn height_f(&self) -> f64 {
        self.height as f64
    }
}

/// An axis-aligned rectangle in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// A `w` x `h` rectangle centred on `(cx, cy)`.
    pub fn centered(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            w,
            h,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}
