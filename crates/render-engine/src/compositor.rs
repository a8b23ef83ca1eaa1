//! Frame compositor: source video plus the active caption, onto a surface.
//!
//! The same routine serves the interactive preview and export. It keeps no
//! state between calls, and every size scales off the surface width, so a
//! 320 px preview and a 720 px export frame differ only in resolution.

use reelcap_project_model::{CaptionChunk, OutputGeometry, PlaybackState, Rect, StyleConfig};
use serde::Serialize;

use crate::surface::{Shadow, Surface, VideoFrame};

/// Width at which `StyleConfig::font_size` is specified.
pub const REFERENCE_WIDTH: f64 = 360.0;

/// Text shrink factor on horizontal outputs.
pub const HORIZONTAL_TEXT_SCALE: f64 = 0.6;

const MAX_LINE_WIDTH_FRACTION: f64 = 0.85;
const LINE_HEIGHT_FACTOR: f64 = 1.4;
const BOX_HEIGHT_FACTOR: f64 = 1.2;
const BOX_PADDING: f64 = 10.0;
const BOX_RADIUS: f64 = 8.0;
const SHADOW_BLUR: f64 = 4.0;
const SHADOW_OFFSET_Y: f64 = 2.0;
const SHADOW_COLOR: [u8; 4] = [0, 0, 0, 204];
const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// Per-frame inputs besides the surface, frame, and caption.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams<'a> {
    pub is_source_vertical: bool,
    /// Horizontal offset, 0 (left) to 100 (right), used when a landscape
    /// source fills a vertical output.
    pub crop_value: f64,
    pub style: &'a StyleConfig,
}

impl<'a> FrameParams<'a> {
    pub fn from_playback(playback: &PlaybackState, style: &'a StyleConfig) -> Self {
        Self {
            is_source_vertical: playback.is_vertical,
            crop_value: playback.crop_value,
            style,
        }
    }
}

/// A laid-out caption line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionLine {
    pub text: String,
    /// Measured advance width.
    pub width: f64,
    /// Vertical centre of the line.
    pub center_y: f64,
    /// Background box, when the style has one.
    pub box_rect: Option<Rect>,
}

/// Geometry of one caption block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptionLayout {
    /// Resolution/orientation multiplier applied to every style size.
    pub scale: f64,
    pub font_size: f64,
    pub line_height: f64,
    pub center_x: f64,
    pub lines: Vec<CaptionLine>,
}

/// Multiplier from style sizes to output pixels.
pub fn caption_scale(geometry: OutputGeometry) -> f64 {
    let base = geometry.width_f() / REFERENCE_WIDTH;
    if geometry.is_vertical() {
        base
    } else {
        base * HORIZONTAL_TEXT_SCALE
    }
}

/// Greedy word wrap on single spaces.
///
/// A word joins the current line while the joined width stays under
/// `max_width`. A single word wider than the limit gets a line to itself.
pub fn wrap_lines(measure: impl Fn(&str) -> f64, text: &str, max_width: f64) -> Vec<String> {
    let mut words = text.split(' ');
    let Some(first) = words.next() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    let mut current = first.to_string();
    for word in words {
        let candidate = format!("{current} {word}");
        if measure(&candidate) < max_width {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    lines.push(current);
    lines
}

/// Lay out `text` for the surface: select the font, wrap, and position
/// each line around the style's vertical anchor.
pub fn caption_layout<S: Surface + ?Sized>(
    surface: &mut S,
    style: &StyleConfig,
    text: &str,
) -> CaptionLayout {
    let geometry = OutputGeometry::new(surface.width(), surface.height());
    let scale = caption_scale(geometry);
    let font_size = style.font_size * scale;
    let line_height = font_size * LINE_HEIGHT_FACTOR;
    let max_width = geometry.width_f() * MAX_LINE_WIDTH_FRACTION;
    let center_x = geometry.width_f() / 2.0;

    surface.set_font(style.font_family, font_size);
    let texts = wrap_lines(|s| surface.measure_text(s), text, max_width);

    let total_height = texts.len() as f64 * line_height;
    let start_y = geometry.height_f() * (style.vertical_position_percent / 100.0)
        - total_height / 2.0
        + line_height / 2.0;

    let lines = texts
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let width = surface.measure_text(&text);
            let center_y = start_y + index as f64 * line_height;
            let box_rect = (style.background_opacity > 0.0).then(|| {
                Rect::centered(
                    center_x,
                    center_y,
                    width + 2.0 * BOX_PADDING * scale,
                    font_size * BOX_HEIGHT_FACTOR,
                )
            });
            CaptionLine {
                text,
                width,
                center_y,
                box_rect,
            }
        })
        .collect();

    CaptionLayout {
        scale,
        font_size,
        line_height,
        center_x,
        lines,
    }
}

/// Where the source frame lands on the output.
///
/// - vertical output, vertical source: stretch to fill
/// - vertical output, landscape source: fill the height, slide by `crop_value`
/// - horizontal output, vertical source: fill the height, centred
/// - horizontal output, landscape source: stretch to fill
pub fn video_placement(
    output: OutputGeometry,
    source_width: u32,
    source_height: u32,
    is_source_vertical: bool,
    crop_value: f64,
) -> Rect {
    let (w, h) = (output.width_f(), output.height_f());
    let fill_height_width = || source_width.max(1) as f64 * (h / source_height.max(1) as f64);

    match (output.is_vertical(), is_source_vertical) {
        (true, false) => {
            let scaled_w = fill_height_width();
            let offset = -(scaled_w - w) * (crop_value.clamp(0.0, 100.0) / 100.0);
            Rect::new(offset, 0.0, scaled_w, h)
        }
        (false, true) => {
            let scaled_w = fill_height_width();
            Rect::new((w - scaled_w) / 2.0, 0.0, scaled_w, h)
        }
        _ => Rect::new(0.0, 0.0, w, h),
    }
}

/// Draw one output frame.
///
/// Fixed order: background, video (if a frame is available), then the
/// caption block. Output depends only on the arguments.
pub fn render<S: Surface + ?Sized>(
    surface: &mut S,
    frame: Option<&VideoFrame>,
    params: &FrameParams<'_>,
    active: Option<&CaptionChunk>,
) {
    let geometry = OutputGeometry::new(surface.width(), surface.height());

    surface.fill_rect(
        Rect::new(0.0, 0.0, geometry.width_f(), geometry.height_f()),
        BACKGROUND,
    );

    if let Some(frame) = frame {
        let dest = video_placement(
            geometry,
            frame.width(),
            frame.height(),
            params.is_source_vertical,
            params.crop_value,
        );
        surface.draw_frame(frame, dest);
    }

    let Some(chunk) = active else {
        return;
    };

    let style = params.style.clamped();
    let layout = caption_layout(surface, &style, &chunk.text);
    let text_color = style.text_color.with_alpha(1.0);
    let box_color = style
        .background_color
        .with_alpha(style.background_opacity / 100.0);
    let shadow = Shadow {
        color: SHADOW_COLOR,
        blur: SHADOW_BLUR * layout.scale,
        offset_y: SHADOW_OFFSET_Y * layout.scale,
    };

    for line in &layout.lines {
        if let Some(rect) = line.box_rect {
            surface.fill_rounded_rect(rect, BOX_RADIUS * layout.scale, box_color);
        }
        surface.fill_text_centered(
            &line.text,
            layout.center_x,
            line.center_y,
            text_color,
            Some(&shadow),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DisplayList, DrawOp};
    use image::RgbaImage;
    use proptest::prelude::*;
    use reelcap_project_model::AspectPreset;

    fn frame(w: u32, h: u32) -> VideoFrame {
        VideoFrame::new(1.0, RgbaImage::new(w, h))
    }

    fn params(style: &StyleConfig, is_source_vertical: bool, crop_value: f64) -> FrameParams<'_> {
        FrameParams {
            is_source_vertical,
            crop_value,
            style,
        }
    }

    #[test]
    fn test_placement_vertical_output_landscape_source_crop() {
        let out = AspectPreset::Vertical.export_geometry();
        let left = video_placement(out, 1920, 1080, false, 0.0);
        let centre = video_placement(out, 1920, 1080, false, 50.0);
        let right = video_placement(out, 1920, 1080, false, 100.0);

        let scaled_w = 1920.0 * (1280.0 / 1080.0);
        assert!((left.w - scaled_w).abs() < 1e-9);
        assert_eq!(left.x, 0.0);
        assert!((centre.x + (scaled_w - 720.0) / 2.0).abs() < 1e-9);
        assert!((right.right() - 720.0).abs() < 1e-9);
        assert_eq!(left.h, 1280.0);
    }

    #[test]
    fn test_placement_stretch_and_letterbox() {
        let vertical = AspectPreset::Vertical.export_geometry();
        let horizontal = AspectPreset::Horizontal.export_geometry();

        assert_eq!(
            video_placement(vertical, 1080, 1920, true, 30.0),
            Rect::new(0.0, 0.0, 720.0, 1280.0)
        );
        assert_eq!(
            video_placement(horizontal, 1920, 1080, false, 30.0),
            Rect::new(0.0, 0.0, 1280.0, 720.0)
        );

        let boxed = video_placement(horizontal, 1080, 1920, true, 0.0);
        assert_eq!(boxed.h, 720.0);
        assert!((boxed.w - 405.0).abs() < 1e-9);
        assert!((boxed.x - (1280.0 - 405.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_caption_scale_by_orientation() {
        assert_eq!(caption_scale(OutputGeometry::new(720, 1280)), 2.0);
        assert!((caption_scale(OutputGeometry::new(1280, 720)) - 1280.0 / 360.0 * 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_lines_greedy() {
        let measure = |s: &str| s.len() as f64;
        assert_eq!(
            wrap_lines(measure, "aa bb cc dd", 6.0),
            vec!["aa bb", "cc dd"]
        );
        // Strictly under the limit.
        assert_eq!(wrap_lines(measure, "aa bb", 5.0), vec!["aa", "bb"]);
        assert_eq!(wrap_lines(measure, "enormousword x", 4.0), vec!["enormousword", "x"]);
        assert_eq!(wrap_lines(measure, "", 4.0), vec![""]);
    }

    #[test]
    fn test_render_order_and_caption_geometry() {
        let style = StyleConfig::default();
        let chunk = CaptionChunk::new(0.0, 2.0, "hello world");
        let mut list = DisplayList::new(720, 1280);

        render(
            &mut list,
            Some(&frame(1080, 1920)),
            &params(&style, true, 50.0),
            Some(&chunk),
        );

        assert!(matches!(list.ops[0], DrawOp::FillRect { color: [0, 0, 0, 255], .. }));
        assert!(matches!(list.ops[1], DrawOp::Frame { .. }));
        assert!(matches!(list.ops[2], DrawOp::SetFont { px, .. } if px == 76.0));
        match &list.ops[3] {
            DrawOp::RoundedRect { rect, radius, color } => {
                assert_eq!(*radius, 16.0);
                assert_eq!(*color, [0, 0, 0, 153]);
                assert!((rect.h - 76.0 * 1.2).abs() < 1e-9);
                assert!((rect.center().1 - 1280.0 * 0.75).abs() < 1e-9);
            }
            other => panic!("expected box, got {other:?}"),
        }
        match &list.ops[4] {
            DrawOp::Text { text, cx, shadow, .. } => {
                assert_eq!(text, "hello world");
                assert_eq!(*cx, 360.0);
                let shadow = shadow.unwrap();
                assert_eq!(shadow.blur, 8.0);
                assert_eq!(shadow.offset_y, 4.0);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_opacity_draws_no_box() {
        let style = StyleConfig {
            background_opacity: 0.0,
            ..StyleConfig::default()
        };
        let chunk = CaptionChunk::new(0.0, 2.0, "no box here");
        let mut list = DisplayList::new(320, 568);
        render(&mut list, None, &params(&style, false, 50.0), Some(&chunk));

        assert!(!list.ops.iter().any(|op| matches!(op, DrawOp::RoundedRect { .. })));
        assert!(!list.ops.iter().any(|op| matches!(op, DrawOp::Frame { .. })));
        assert_eq!(list.text_lines(), vec!["no box here"]);
    }

    #[test]
    fn test_multiline_block_centred_on_anchor() {
        let style = StyleConfig::default();
        let mut list = DisplayList::new(720, 1280);
        let layout = caption_layout(&mut list, &style, "this caption is long enough to wrap twice over");

        assert!(layout.lines.len() > 1);
        let first = layout.lines.first().unwrap().center_y;
        let last = layout.lines.last().unwrap().center_y;
        assert!(((first + last) / 2.0 - 960.0).abs() < 1e-9);
        for line in &layout.lines {
            assert!(line.width < 720.0 * 0.85 || !line.text.contains(' '));
        }
    }

    #[test]
    fn test_no_caption_means_only_background_and_video() {
        let style = StyleConfig::default();
        let mut list = DisplayList::new(560, 315);
        render(&mut list, Some(&frame(16, 9)), &params(&style, false, 50.0), None);
        assert_eq!(list.ops.len(), 2);
    }

    #[test]
    fn test_preview_and_export_scale_proportionally() {
        let style = StyleConfig::default();
        let mut preview = DisplayList::new(360, 640);
        let mut export = DisplayList::new(720, 1280);
        let a = caption_layout(&mut preview, &style, "same words");
        let b = caption_layout(&mut export, &style, "same words");
        assert!((b.font_size - 2.0 * a.font_size).abs() < 1e-9);
        assert!((b.lines[0].center_y - 2.0 * a.lines[0].center_y).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_wrap_never_exceeds_width(
            words in prop::collection::vec("[a-z]{1,10}", 1..30),
            max_width in 20.0f64..200.0,
        ) {
            let text = words.join(" ");
            let measure = |s: &str| s.chars().count() as f64 * 6.0;
            let lines = wrap_lines(measure, &text, max_width);

            prop_assert_eq!(lines.join(" "), text);
            for line in &lines {
                // Only a lone overlong word may exceed the limit.
                prop_assert!(measure(line) < max_width || !line.contains(' '));
            }
        }

        #[test]
        fn prop_render_is_pure(
            time in 0.0f64..10.0,
            crop in 0.0f64..100.0,
            opacity in 0.0f64..100.0,
        ) {
            let style = StyleConfig { background_opacity: opacity, ..StyleConfig::default() };
            let chunk = CaptionChunk::new(0.0, 10.0, "a stable caption line for purity");
            let video = VideoFrame::new(time, RgbaImage::new(32, 18));
            let p = params(&style, false, crop);

            let mut first = DisplayList::new(720, 1280);
            let mut second = DisplayList::new(720, 1280);
            render(&mut first, Some(&video), &p, Some(&chunk));
            render(&mut second, Some(&video), &p, Some(&chunk));
            prop_assert_eq!(first, second);
        }
    }
}
