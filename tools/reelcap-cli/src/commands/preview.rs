//! Render one composited frame.

use std::path::PathBuf;
use std::sync::Arc;

use reelcap_common::config::AppConfig;
use reelcap_processing_core::active_chunk;
use reelcap_project_model::PlaybackState;
use reelcap_render_engine::ffmpeg::FfmpegVideoSource;
use reelcap_render_engine::{render, DisplayList, FontBook, FrameParams, RasterSurface};

use super::load_project;

pub fn run(
    config: &AppConfig,
    path: PathBuf,
    time: f64,
    output: Option<PathBuf>,
    full_size: bool,
    display_list: bool,
) -> anyhow::Result<()> {
    let project = load_project(&path)?;

    let mut playback = project.playback_state().unwrap_or_else(|| {
        let end = project
            .captions
            .iter()
            .map(|c| c.end)
            .fold(0.0, f64::max);
        let mut state = PlaybackState::new(end, 16, 9);
        state.set_crop(project.project.output.crop_value);
        state
    });
    let time = playback.seek(time);

    let frame = match project.source_path() {
        Some(source) => match FfmpegVideoSource::open(&source, config.export.fps)
            .and_then(|video| video.frame_at(time))
        {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!(error = %e, "Rendering without a video frame");
                None
            }
        },
        None => None,
    };

    let preset = project.project.output.preset;
    let geometry = if full_size {
        preset.export_geometry()
    } else {
        preset.preview_geometry()
    };
    let params = FrameParams::from_playback(&playback, &project.project.style);
    let active = active_chunk(time, project.captions.chunks());

    if display_list {
        let mut list = DisplayList::new(geometry.width, geometry.height);
        render(&mut list, frame.as_ref(), &params, active);
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    let fonts = Arc::new(FontBook::load(&config.fonts));
    if !fonts.has_glyphs() {
        println!("Warning: no fonts found; caption text will be missing. See `reelcap check`.");
    }

    let mut surface = RasterSurface::new(geometry.width, geometry.height, fonts);
    render(&mut surface, frame.as_ref(), &params, active);

    let output = match output {
        Some(output) => output,
        None => {
            let dir = project.exports_dir();
            std::fs::create_dir_all(&dir)?;
            dir.join(format!("preview_{:.2}s.png", time))
        }
    };
    surface.save_png(&output)?;

    println!("Preview at {time:.2}s written to {}", output.display());
    println!("  {}x{} ({})", geometry.width, geometry.height, preset);
    match active {
        Some(chunk) => println!("  Caption: {}", chunk.text),
        None => println!("  Caption: (none)"),
    }
    Ok(())
}
