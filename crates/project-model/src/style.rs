//! Caption styling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fonts offered for captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FontFamily {
    #[default]
    Montserrat,
    Inter,
    Oswald,
    Arial,
}

impl FontFamily {
    pub const ALL: [FontFamily; 4] = [
        FontFamily::Montserrat,
        FontFamily::Inter,
        FontFamily::Oswald,
        FontFamily::Arial,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FontFamily::Montserrat => "Montserrat",
            FontFamily::Inter => "Inter",
            FontFamily::Oswald => "Oswald",
            FontFamily::Arial => "Arial",
        }
    }
}

impl fmt::Display for FontFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FontFamily {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FontFamily::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StyleError::UnknownFont(s.to_string()))
    }
}

/// An opaque RGB color written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HexColor {
    pub const WHITE: HexColor = HexColor::rgb(255, 255, 255);
    pub const BLACK: HexColor = HexColor::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// RGBA bytes with the given alpha fraction in `[0, 1]`.
    pub fn with_alpha(&self, alpha: f64) -> [u8; 4] {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        [self.r, self.g, self.b, a]
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for HexColor {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim();
        let digits = hex
            .strip_prefix('#')
            .ok_or_else(|| StyleError::InvalidColor(s.to_string()))?;
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(StyleError::InvalidColor(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| StyleError::InvalidColor(s.to_string()))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl TryFrom<String> for HexColor {
    type Error = StyleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.to_string()
    }
}

/// Caption style for one editing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub font_family: FontFamily,

    /// Font size in px at a 360 px reference width. Range 20-120.
    pub font_size: f64,

    pub text_color: HexColor,

    pub background_color: HexColor,

    /// Background box opacity, 0-100. Zero disables the box.
    pub background_opacity: f64,

    /// Vertical centre of the caption block as a percentage of output height, 10-90.
    pub vertical_position_percent: f64,
}

impl StyleConfig {
    pub const FONT_SIZE_RANGE: (f64, f64) = (20.0, 120.0);
    pub const OPACITY_RANGE: (f64, f64) = (0.0, 100.0);
    pub const POSITION_RANGE: (f64, f64) = (10.0, 90.0);

    /// Copy of this style with every numeric field inside its range.
    pub fn clamped(&self) -> Self {
        Self {
            font_size: self
                .font_size
                .clamp(Self::FONT_SIZE_RANGE.0, Self::FONT_SIZE_RANGE.1),
            background_opacity: self
                .background_opacity
                .clamp(Self::OPACITY_RANGE.0, Self::OPACITY_RANGE.1),
            vertical_position_percent: self
                .vertical_position_percent
                .clamp(Self::POSITION_RANGE.0, Self::POSITION_RANGE.1),
            ..self.clone()
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            font_family: FontFamily::Montserrat,
            font_size: 38.0,
            text_color: HexColor::WHITE,
            background_color: HexColor::BLACK,
            background_opacity: 60.0,
            vertical_position_percent: 75.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StyleError {
    #[error("Unknown font family: {0} (expected Montserrat, Inter, Oswald or Arial)")]
    UnknownFont(String),

    #[error("Invalid color: {0} (expected #rrggbb)")]
    InvalidColor(String),
}
