//! Edit captions, caption style, and output framing.

use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use reelcap_processing_core::timeline::{DragMode, PointerTarget};
use reelcap_processing_core::{TimelineAction, TimelineModel, TrackView};
use reelcap_project_model::{AspectPreset, FontFamily, HexColor, LoadedProject};

use super::{chunk_at, load_project, save_project};

#[derive(Subcommand)]
pub enum EditAction {
    /// Replace a caption's text
    Text {
        /// Caption number as listed by `reelcap captions`
        index: usize,

        /// New text
        text: String,
    },

    /// Set a caption's start and/or end time in seconds
    Timing {
        /// Caption number as listed by `reelcap captions`
        index: usize,

        #[arg(long)]
        start: Option<f64>,

        #[arg(long)]
        end: Option<f64>,
    },

    /// Drag a caption block along the timeline by a pixel offset
    Drag {
        /// Caption number as listed by `reelcap captions`
        index: usize,

        /// Which part of the block to grab
        #[arg(long, value_enum, default_value = "body")]
        grab: Grab,

        /// Horizontal pointer movement in pixels
        #[arg(long, allow_negative_numbers = true)]
        dx: f64,

        /// Timeline zoom in pixels per second (10-200)
        #[arg(long, default_value = "50")]
        zoom: f64,
    },

    /// Change the caption style
    Style {
        /// Montserrat, Inter, Oswald or Arial
        #[arg(long)]
        font: Option<FontFamily>,

        /// Font size at the 360 px reference width (20-120)
        #[arg(long)]
        size: Option<f64>,

        /// Text color (#rrggbb)
        #[arg(long)]
        text_color: Option<HexColor>,

        /// Background box color (#rrggbb)
        #[arg(long)]
        background: Option<HexColor>,

        /// Background box opacity (0-100, 0 hides the box)
        #[arg(long)]
        opacity: Option<f64>,

        /// Vertical position of the captions in percent of height (10-90)
        #[arg(long)]
        position: Option<f64>,
    },

    /// Change the output format and crop
    Framing {
        /// vertical (9:16) or horizontal (16:9)
        #[arg(long)]
        preset: Option<AspectPreset>,

        /// Horizontal crop offset for landscape sources in a vertical frame (0-100)
        #[arg(long)]
        crop: Option<f64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Grab {
    /// Move the whole block
    Body,
    /// Resize from the left edge
    Start,
    /// Resize from the right edge
    End,
}

impl From<Grab> for DragMode {
    fn from(grab: Grab) -> Self {
        match grab {
            Grab::Body => DragMode::Move,
            Grab::Start => DragMode::ResizeStart,
            Grab::End => DragMode::ResizeEnd,
        }
    }
}

pub fn run(path: PathBuf, action: EditAction) -> anyhow::Result<()> {
    let mut project = load_project(&path)?;

    match action {
        EditAction::Text { index, text } => {
            let id = chunk_at(&project, index)?;
            if !project.captions.edit_text(id, text.trim()) {
                anyhow::bail!("Caption text cannot be empty");
            }
            println!("Caption #{index} updated.");
        }
        EditAction::Timing { index, start, end } => {
            let id = chunk_at(&project, index)?;
            let (current_start, current_end) = project
                .captions
                .get(id)
                .map(|c| (c.start, c.end))
                .ok_or_else(|| anyhow::anyhow!("Caption #{index} vanished"))?;
            let chunk = project
                .captions
                .set_timing(
                    id,
                    start.unwrap_or(current_start),
                    end.unwrap_or(current_end),
                )
                .ok_or_else(|| anyhow::anyhow!("Caption #{index} vanished"))?;
            println!(
                "Caption #{index}: {:.2}s - {:.2}s",
                chunk.start, chunk.end
            );
        }
        EditAction::Drag {
            index,
            grab,
            dx,
            zoom,
        } => drag(&mut project, index, grab, dx, zoom)?,
        EditAction::Style {
            font,
            size,
            text_color,
            background,
            opacity,
            position,
        } => {
            let style = &mut project.project.style;
            if let Some(font) = font {
                style.font_family = font;
            }
            if let Some(size) = size {
                style.font_size = size;
            }
            if let Some(color) = text_color {
                style.text_color = color;
            }
            if let Some(color) = background {
                style.background_color = color;
            }
            if let Some(opacity) = opacity {
                style.background_opacity = opacity;
            }
            if let Some(position) = position {
                style.vertical_position_percent = position;
            }
            *style = style.clamped();
            println!(
                "Style: {} {}px, text {}, box {} at {}%, position {}%",
                style.font_family,
                style.font_size,
                style.text_color,
                style.background_color,
                style.background_opacity,
                style.vertical_position_percent
            );
        }
        EditAction::Framing { preset, crop } => {
            let output = &mut project.project.output;
            if let Some(preset) = preset {
                output.preset = preset;
            }
            if let Some(crop) = crop {
                output.crop_value = crop.clamp(0.0, 100.0);
            }
            let geometry = output.preset.export_geometry();
            println!(
                "Framing: {} ({}x{}), crop {}",
                output.preset, geometry.width, geometry.height, output.crop_value
            );
        }
    }

    save_project(&mut project)
}

/// Replay a press, one move of `dx` pixels, and a release on the timeline.
fn drag(
    project: &mut LoadedProject,
    index: usize,
    grab: Grab,
    dx: f64,
    zoom: f64,
) -> anyhow::Result<()> {
    let id = chunk_at(project, index)?;
    let duration = project
        .project
        .source
        .as_ref()
        .map(|s| s.duration_secs)
        .unwrap_or_else(|| {
            project
                .captions
                .iter()
                .map(|c| c.end)
                .fold(0.0, f64::max)
        });

    let mut timeline = TimelineModel::new(duration);
    timeline.set_zoom(zoom);
    let view = TrackView::default();

    let chunk = project
        .captions
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("Caption #{index} vanished"))?;
    let (left, width) = timeline.chunk_block(chunk);
    let press_x = match grab {
        Grab::Body => left + width / 2.0,
        Grab::Start => left,
        Grab::End => left + width,
    };

    let target = PointerTarget::Chunk {
        id,
        mode: grab.into(),
    };
    timeline.pointer_down(press_x, target, &view, &project.captions);
    let moved = timeline.pointer_move(press_x + dx, &view, &mut project.captions);
    let released = timeline.pointer_up();

    match (moved, released) {
        (_, Some(TimelineAction::Seek(time))) => {
            println!("No movement; playhead would seek to {time:.2}s.");
        }
        (Some(TimelineAction::ChunkUpdated(_)), _) => {
            if let Some(chunk) = project.captions.get(id) {
                println!(
                    "Caption #{index}: {:.2}s - {:.2}s ({:.0} px/s)",
                    chunk.start,
                    chunk.end,
                    timeline.pixels_per_second()
                );
            }
        }
        _ => anyhow::bail!("Drag was not applied"),
    }
    Ok(())
}
