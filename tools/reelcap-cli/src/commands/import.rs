//! Attach a source video to a project.

use std::path::{Path, PathBuf};

use reelcap_project_model::{is_vertical_source, LoadedProject, SourceRef};
use reelcap_render_engine::ffmpeg::probe_video;

use super::{load_project, save_project};

pub fn run(path: PathBuf, video: PathBuf) -> anyhow::Result<()> {
    let mut project = load_project(&path)?;
    attach(&mut project, &video)
}

pub fn attach(project: &mut LoadedProject, video: &Path) -> anyhow::Result<()> {
    let video = std::fs::canonicalize(video)
        .map_err(|e| anyhow::anyhow!("Cannot open {}: {e}", video.display()))?;
    let probe = probe_video(&video)?;

    let dropped = project.captions.len();
    project.attach_source(SourceRef {
        path: video.clone(),
        width: probe.width,
        height: probe.height,
        duration_secs: probe.duration_secs,
    });
    save_project(project)?;

    println!("Source attached: {}", video.display());
    println!(
        "  {}x{} ({}), {:.1}s",
        probe.width,
        probe.height,
        if is_vertical_source(probe.width, probe.height) {
            "vertical"
        } else {
            "horizontal"
        },
        probe.duration_secs
    );
    if dropped > 0 {
        println!("  Dropped {dropped} caption(s) from the previous source.");
    }
    println!("Next: reelcap transcribe {}", project.root.display());

    Ok(())
}
