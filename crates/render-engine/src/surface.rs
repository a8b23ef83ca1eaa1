//! Drawing surfaces for the frame compositor.
//!
//! [`Surface`] is the small set of 2D operations the compositor needs.
//! [`RasterSurface`] draws into an RGBA buffer (export and PNG previews);
//! [`DisplayList`] records the operations instead, which keeps compositor
//! tests independent of installed fonts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use reelcap_common::config::FontConfig;
use reelcap_common::error::{ReelcapError, ReelcapResult};
use reelcap_project_model::{FontFamily, Rect};
use serde::Serialize;

/// Average advance per character, as a fraction of the pixel size, used
/// when no font face is available.
const ESTIMATED_ADVANCE: f64 = 0.6;

/// A decoded video frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation time in seconds.
    pub time_secs: f64,
    pub image: RgbaImage,
}

impl VideoFrame {
    pub fn new(time_secs: f64, image: RgbaImage) -> Self {
        Self { time_secs, image }
    }

    /// Wrap a tightly packed RGBA buffer. `None` if the length doesn't match.
    pub fn from_rgba(time_secs: f64, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(|image| Self { time_secs, image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Soft drop shadow behind text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Shadow {
    pub color: [u8; 4],
    pub blur: f64,
    pub offset_y: f64,
}

/// The 2D operations the compositor draws with.
pub trait Surface {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Opaque fill; replaces what is underneath.
    fn fill_rect(&mut self, rect: Rect, color: [u8; 4]);

    /// Draw a frame scaled into `dest`. `dest` may extend past the surface.
    fn draw_frame(&mut self, frame: &VideoFrame, dest: Rect);

    /// Select the caption font for subsequent measure/draw calls.
    fn set_font(&mut self, family: FontFamily, px: f64);

    /// Advance width of `text` in the current font.
    fn measure_text(&self, text: &str) -> f64;

    /// Alpha-blended rounded rectangle.
    fn fill_rounded_rect(&mut self, rect: Rect, radius: f64, color: [u8; 4]);

    /// Draw one line of text centred on `(cx, cy)`.
    fn fill_text_centered(
        &mut self,
        text: &str,
        cx: f64,
        cy: f64,
        color: [u8; 4],
        shadow: Option<&Shadow>,
    );
}

/// Caption font faces keyed by family.
#[derive(Clone, Default)]
pub struct FontBook {
    faces: HashMap<FontFamily, FontArc>,
    fallback: Option<FontArc>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("families", &self.faces.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl FontBook {
    /// A book with no faces: widths are estimated and no glyphs are drawn.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve every caption family from explicit overrides, then by file
    /// name in the configured and system font directories.
    pub fn load(config: &FontConfig) -> Self {
        let mut files = Vec::new();
        for dir in config.search_dirs() {
            collect_font_files(&dir, 4, &mut files);
        }

        let mut book = Self::empty();
        for family in FontFamily::ALL {
            let override_path = config
                .files
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(family.name()))
                .map(|(_, path)| path.clone());

            let path = override_path.or_else(|| best_match(&files, family.name()));
            if let Some(face) = path.as_deref().and_then(load_face) {
                tracing::debug!(family = family.name(), path = ?path, "Loaded caption font");
                book.faces.insert(family, face);
            }
        }

        book.fallback = FontFamily::ALL
            .iter()
            .find_map(|family| book.faces.get(family).cloned())
            .or_else(|| best_match(&files, "sans").as_deref().and_then(load_face))
            .or_else(|| files.first().and_then(|path| load_face(path)));

        if book.fallback.is_none() {
            tracing::warn!(
                searched = files.len(),
                "No usable font found; captions will not be drawn"
            );
        } else {
            tracing::info!(
                families = book.faces.len(),
                "Caption fonts ready"
            );
        }

        book
    }

    pub fn insert(&mut self, family: FontFamily, face: FontArc) {
        if self.fallback.is_none() {
            self.fallback = Some(face.clone());
        }
        self.faces.insert(family, face);
    }

    /// The face for `family`, or the fallback face.
    pub fn face(&self, family: FontFamily) -> Option<&FontArc> {
        self.faces.get(&family).or(self.fallback.as_ref())
    }

    pub fn has_glyphs(&self) -> bool {
        self.fallback.is_some()
    }

    /// Whether `family` resolved to its own face rather than the fallback.
    pub fn has_family(&self, family: FontFamily) -> bool {
        self.faces.contains_key(&family)
    }

    /// Advance width of `text` at `px`.
    pub fn measure(&self, family: FontFamily, px: f64, text: &str) -> f64 {
        let Some(font) = self.face(family) else {
            return text.chars().count() as f64 * px * ESTIMATED_ADVANCE;
        };

        let scaled = font.as_scaled(PxScale::from(px as f32));
        let mut width = 0.0f32;
        let mut previous = None;
        for c in text.chars() {
            let glyph = scaled.glyph_id(c);
            if let Some(prev) = previous {
                width += scaled.kern(prev, glyph);
            }
            width += scaled.h_advance(glyph);
            previous = Some(glyph);
        }
        width as f64
    }
}

fn load_face(path: &Path) -> Option<FontArc> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to read font file");
            return None;
        }
    };
    match FontArc::try_from_vec(bytes) {
        Ok(face) => Some(face),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Invalid font file");
            None
        }
    }
}

fn collect_font_files(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            if depth > 0 {
                collect_font_files(&path, depth - 1, out);
            }
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"))
        {
            out.push(path);
        }
    }
}

/// Pick the font file whose name starts with (or, for generic names,
/// contains) `family`, preferring bold faces.
fn best_match(files: &[PathBuf], family: &str) -> Option<PathBuf> {
    let family = family.to_ascii_lowercase();
    files
        .iter()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
            let normalized: String = stem.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
            let matches = if family == "sans" {
                normalized.contains(&family)
            } else {
                normalized.starts_with(&family)
            };
            if !matches {
                return None;
            }
            let style = normalized
                .trim_start_matches(&family)
                .trim_start_matches("variablefont");
            let score = if style == "bold" || style.ends_with("sansbold") {
                3
            } else if style.contains("bold") && !style.contains("italic") {
                2
            } else if style.is_empty() || style == "regular" {
                1
            } else {
                0
            };
            Some((score, path))
        })
        .max_by_key(|(score, _)| *score)
        .map(|(_, path)| path.clone())
}

/// Surface backed by an RGBA pixel buffer.
pub struct RasterSurface {
    canvas: RgbaImage,
    fonts: Arc<FontBook>,
    family: FontFamily,
    px: f64,
}

impl RasterSurface {
    pub fn new(width: u32, height: u32, fonts: Arc<FontBook>) -> Self {
        Self {
            canvas: RgbaImage::new(width.max(1), height.max(1)),
            fonts,
            family: FontFamily::default(),
            px: 16.0,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }

    /// Tightly packed RGBA bytes, row-major.
    pub fn as_rgba(&self) -> &[u8] {
        self.canvas.as_raw()
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> ReelcapResult<()> {
        let path = path.as_ref();
        self.canvas
            .save(path)
            .map_err(|e| ReelcapError::render(format!("Failed to write {}: {e}", path.display())))
    }

    fn pixel_bounds(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let x0 = rect.x.floor().max(0.0);
        let y0 = rect.y.floor().max(0.0);
        let x1 = rect.right().ceil().min(self.canvas.width() as f64);
        let y1 = rect.bottom().ceil().min(self.canvas.height() as f64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

impl Surface for RasterSurface {
    fn width(&self) -> u32 {
        self.canvas.width()
    }

    fn height(&self) -> u32 {
        self.canvas.height()
    }

    fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        if let Some((x0, y0, x1, y1)) = self.pixel_bounds(rect) {
            draw_filled_rect_mut(
                &mut self.canvas,
                imageproc::rect::Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0),
                Rgba(color),
            );
        }
    }

    fn draw_frame(&mut self, frame: &VideoFrame, dest: Rect) {
        let w = dest.w.round().max(1.0) as u32;
        let h = dest.h.round().max(1.0) as u32;
        let x = dest.x.round() as i64;
        let y = dest.y.round() as i64;

        if frame.width() == w && frame.height() == h {
            imageops::overlay(&mut self.canvas, &frame.image, x, y);
        } else {
            let scaled = imageops::resize(&frame.image, w, h, FilterType::Triangle);
            imageops::overlay(&mut self.canvas, &scaled, x, y);
        }
    }

    fn set_font(&mut self, family: FontFamily, px: f64) {
        self.family = family;
        self.px = px.max(1.0);
    }

    fn measure_text(&self, text: &str) -> f64 {
        self.fonts.measure(self.family, self.px, text)
    }

    fn fill_rounded_rect(&mut self, rect: Rect, radius: f64, color: [u8; 4]) {
        let Some((x0, y0, x1, y1)) = self.pixel_bounds(rect) else {
            return;
        };
        let r = radius.clamp(0.0, rect.w.min(rect.h) / 2.0);
        let (inner_x0, inner_x1) = (rect.x + r, rect.right() - r);
        let (inner_y0, inner_y1) = (rect.y + r, rect.bottom() - r);
        let paint = Rgba(color);

        for py in y0..y1 {
            for px in x0..x1 {
                let (cx, cy) = (px as f64 + 0.5, py as f64 + 0.5);
                if cx < rect.x || cx > rect.right() || cy < rect.y || cy > rect.bottom() {
                    continue;
                }
                let dx = (inner_x0 - cx).max(cx - inner_x1).max(0.0);
                let dy = (inner_y0 - cy).max(cy - inner_y1).max(0.0);
                if dx * dx + dy * dy <= r * r {
                    self.canvas.get_pixel_mut(px, py).blend(&paint);
                }
            }
        }
    }

    fn fill_text_centered(
        &mut self,
        text: &str,
        cx: f64,
        cy: f64,
        color: [u8; 4],
        shadow: Option<&Shadow>,
    ) {
        let fonts = Arc::clone(&self.fonts);
        let Some(font) = fonts.face(self.family) else {
            return;
        };
        let scale = PxScale::from(self.px as f32);
        let scaled = font.as_scaled(scale);
        let line_height = (scaled.ascent() - scaled.descent()) as f64;
        let width = self.measure_text(text);
        let left = (cx - width / 2.0).round() as i32;
        let top = (cy - line_height / 2.0).round() as i32;

        if let Some(shadow) = shadow {
            let margin = (shadow.blur * 1.5).ceil() as u32 + 2;
            let mut layer = RgbaImage::new(
                width.ceil() as u32 + 2 * margin,
                line_height.ceil() as u32 + 2 * margin,
            );
            let [r, g, b, a] = shadow.color;
            draw_text_mut(
                &mut layer,
                Rgba([r, g, b, 255]),
                margin as i32,
                margin as i32,
                scale,
                font,
                text,
            );
            let sigma = (shadow.blur / 2.0) as f32;
            if sigma >= 0.1 {
                layer = imageproc::filter::gaussian_blur_f32(&layer, sigma);
            }
            for pixel in layer.pixels_mut() {
                pixel[3] = ((pixel[3] as u32 * a as u32) / 255) as u8;
            }
            imageops::overlay(
                &mut self.canvas,
                &layer,
                left as i64 - margin as i64,
                top as i64 - margin as i64 + shadow.offset_y.round() as i64,
            );
        }

        draw_text_mut(&mut self.canvas, Rgba(color), left, top, scale, font, text);
    }
}

/// A recorded drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawOp {
    FillRect {
        rect: Rect,
        color: [u8; 4],
    },
    Frame {
        time_secs: f64,
        source_width: u32,
        source_height: u32,
        dest: Rect,
    },
    SetFont {
        family: FontFamily,
        px: f64,
    },
    RoundedRect {
        rect: Rect,
        radius: f64,
        color: [u8; 4],
    },
    Text {
        text: String,
        cx: f64,
        cy: f64,
        color: [u8; 4],
        shadow: Option<Shadow>,
    },
}

/// Surface that records operations instead of drawing pixels.
///
/// Text is measured with a fixed per-character advance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayList {
    pub width: u32,
    pub height: u32,
    pub ops: Vec<DrawOp>,
    #[serde(skip)]
    font_px: f64,
}

impl DisplayList {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            ops: Vec::new(),
            font_px: 16.0,
        }
    }

    /// Text lines drawn, in order.
    pub fn text_lines(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Surface for DisplayList {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn draw_frame(&mut self, frame: &VideoFrame, dest: Rect) {
        self.ops.push(DrawOp::Frame {
            time_secs: frame.time_secs,
            source_width: frame.width(),
            source_height: frame.height(),
            dest,
        });
    }

    fn set_font(&mut self, family: FontFamily, px: f64) {
        self.font_px = px;
        self.ops.push(DrawOp::SetFont { family, px });
    }

    fn measure_text(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.font_px * ESTIMATED_ADVANCE
    }

    fn fill_rounded_rect(&mut self, rect: Rect, radius: f64, color: [u8; 4]) {
        self.ops.push(DrawOp::RoundedRect {
            rect,
            radius,
            color,
        });
    }

    fn fill_text_centered(
        &mut self,
        text: &str,
        cx: f64,
        cy: f64,
        color: [u8; 4],
        shadow: Option<&Shadow>,
    ) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            cx,
            cy,
            color,
            shadow: shadow.copied(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(w: u32, h: u32, color: [u8; 4]) -> VideoFrame {
        VideoFrame::new(0.0, RgbaImage::from_pixel(w, h, Rgba(color)))
    }

    #[test]
    fn test_empty_font_book_estimates_widths() {
        let book = FontBook::empty();
        assert!(!book.has_glyphs());
        assert_eq!(book.measure(FontFamily::Inter, 10.0, "abcd"), 24.0);
        assert_eq!(book.measure(FontFamily::Inter, 10.0, ""), 0.0);
    }

    #[test]
    fn test_best_match_prefers_bold() {
        let files = vec![
            PathBuf::from("/fonts/Montserrat-Regular.ttf"),
            PathBuf::from("/fonts/Montserrat-BoldItalic.ttf"),
            PathBuf::from("/fonts/Montserrat-Bold.ttf"),
            PathBuf::from("/fonts/Inter-Regular.otf"),
        ];
        assert_eq!(
            best_match(&files, "Montserrat"),
            Some(PathBuf::from("/fonts/Montserrat-Bold.ttf"))
        );
        assert_eq!(
            best_match(&files, "Inter"),
            Some(PathBuf::from("/fonts/Inter-Regular.otf"))
        );
        assert_eq!(best_match(&files, "Oswald"), None);
    }

    #[test]
    fn test_raster_fill_and_frame_placement() {
        let mut surface = RasterSurface::new(40, 20, Arc::new(FontBook::empty()));
        surface.fill_rect(Rect::new(0.0, 0.0, 40.0, 20.0), [0, 0, 0, 255]);
        surface.draw_frame(&solid_frame(4, 4, [255, 0, 0, 255]), Rect::new(10.0, 0.0, 20.0, 20.0));

        assert_eq!(surface.image().get_pixel(5, 10).0, [0, 0, 0, 255]);
        let inside = surface.image().get_pixel(20, 10).0;
        assert!(inside[0] >= 250 && inside[1] <= 5, "{inside:?}");
        assert_eq!(surface.image().get_pixel(35, 10).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_frame_partially_offscreen() {
        let mut surface = RasterSurface::new(10, 10, Arc::new(FontBook::empty()));
        surface.fill_rect(Rect::new(0.0, 0.0, 10.0, 10.0), [0, 0, 0, 255]);
        surface.draw_frame(&solid_frame(20, 10, [0, 255, 0, 255]), Rect::new(-5.0, 0.0, 20.0, 10.0));
        assert_eq!(surface.image().get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(surface.image().get_pixel(9, 9).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_rounded_rect_blends_and_skips_corners() {
        let mut surface = RasterSurface::new(20, 20, Arc::new(FontBook::empty()));
        surface.fill_rect(Rect::new(0.0, 0.0, 20.0, 20.0), [255, 255, 255, 255]);
        surface.fill_rounded_rect(Rect::new(0.0, 0.0, 20.0, 20.0), 8.0, [0, 0, 0, 128]);

        // Corner pixel is outside the rounding.
        assert_eq!(surface.image().get_pixel(0, 0).0, [255, 255, 255, 255]);
        // Centre is half-blended toward black.
        let centre = surface.image().get_pixel(10, 10).0;
        assert!(centre[0] > 100 && centre[0] < 160, "{centre:?}");
        assert_eq!(centre[3], 255);
    }

    #[test]
    fn test_text_without_font_draws_nothing() {
        let mut surface = RasterSurface::new(20, 20, Arc::new(FontBook::empty()));
        surface.fill_rect(Rect::new(0.0, 0.0, 20.0, 20.0), [0, 0, 0, 255]);
        let shadow = Shadow {
            color: [0, 0, 0, 204],
            blur: 4.0,
            offset_y: 2.0,
        };
        surface.fill_text_centered("hi", 10.0, 10.0, [255, 255, 255, 255], Some(&shadow));
        assert!(surface.image().pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn test_display_list_records_in_order() {
        let mut list = DisplayList::new(100, 50);
        list.set_font(FontFamily::Oswald, 10.0);
        assert_eq!(list.measure_text("hello"), 30.0);
        list.fill_text_centered("hello", 50.0, 25.0, [255; 4], None);
        assert_eq!(list.text_lines(), vec!["hello"]);
        assert!(matches!(list.ops[0], DrawOp::SetFont { family: FontFamily::Oswald, .. }));
    }
}
