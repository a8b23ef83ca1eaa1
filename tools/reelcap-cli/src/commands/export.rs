//! Export the captioned clip.

use std::path::PathBuf;
use std::sync::Arc;

use reelcap_common::config::AppConfig;
use reelcap_render_engine::ffmpeg::FfmpegVideoSource;
use reelcap_render_engine::{
    ExportJob, ExportOutcome, ExportPipeline, ExportProgress, ExportSettings, ExportState,
    FontBook, FramePacing, ProgressCallback,
};

use super::load_project;

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    output: Option<PathBuf>,
    fps: Option<u32>,
    unpaced: bool,
) -> anyhow::Result<()> {
    println!("Exporting project at: {}", path.display());

    let project = load_project(&path)?;
    let source = project
        .source_path()
        .ok_or_else(|| anyhow::anyhow!("No source video attached. Run `reelcap import` first."))?;

    let mut settings = ExportSettings::from_defaults(&config.export);
    if let Some(fps) = fps {
        settings.fps = fps.max(1);
    }
    if unpaced {
        settings.pacing = FramePacing::Unpaced;
    }

    let mut video = FfmpegVideoSource::open(&source, settings.fps)?;
    let fonts = Arc::new(FontBook::load(&config.fonts));
    if !fonts.has_glyphs() {
        println!("  Warning: no fonts found; captions will not be drawn.");
    }

    let preset = project.project.output.preset;
    let geometry = preset.export_geometry();
    println!("  Source: {}", source.display());
    println!(
        "  Output: {} {}x{} @ {}fps",
        preset, geometry.width, geometry.height, settings.fps
    );
    println!("  Captions: {}", project.captions.len());
    if settings.pacing == FramePacing::RealTime {
        println!(
            "  Recording in real time ({:.1}s). Press Ctrl-C to cancel.",
            video.probe().duration_secs
        );
    }

    let job = ExportJob {
        preset,
        crop_value: project.project.output.crop_value,
        style: project.project.style.clone(),
        captions: project.captions.chunks().to_vec(),
        original_source: Some(source.clone()),
        settings,
    };

    let mut pipeline = ExportPipeline::with_ffmpeg(fonts);

    let cancel = pipeline.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let progress_cb: ProgressCallback = Box::new(|p: ExportProgress| match p.state {
        ExportState::Capturing => print!(
            "\r  Recording: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.percent, p.frames_captured, p.total_frames, p.eta_secs,
        ),
        ExportState::Encoding => print!("\r  Encoding: {:.0}% {}        ", p.percent, p.message),
        _ => {}
    });

    let outcome = pipeline.run(&mut video, &job, Some(progress_cb)).await;
    ctrl_c.abort();

    let (artifact, warning) = match outcome {
        ExportOutcome::Complete(artifact) => (artifact, None),
        ExportOutcome::Fallback { artifact, message } => (artifact, Some(message)),
        ExportOutcome::Cancelled => {
            println!("\nExport cancelled.");
            return Ok(());
        }
        ExportOutcome::Failed(err) => {
            println!();
            return Err(anyhow::anyhow!("Export failed: {err}"));
        }
    };

    let output_path = match output {
        Some(output) => output.with_extension(artifact.extension()),
        None => project
            .exports_dir()
            .join(artifact.suggested_file_name(Some(source.as_path()))),
    };
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    artifact.write_to(&output_path)?;

    if let Some(message) = warning {
        println!("\n  Warning: {message}");
    }
    println!(
        "\nExport complete: {} ({:.1} MB)",
        output_path.display(),
        artifact.bytes.len() as f64 / 1_048_576.0
    );
    Ok(())
}
