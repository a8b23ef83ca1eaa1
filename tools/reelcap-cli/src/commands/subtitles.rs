//! Write captions as a subtitle file.

use std::path::PathBuf;

use reelcap_audio_ai::save_subtitles;

use super::{load_project, source_stem};

pub fn run(path: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let project = load_project(&path)?;
    if project.captions.is_empty() {
        anyhow::bail!("Project has no captions. Run `reelcap transcribe` first.");
    }

    let output = match output {
        Some(output) => output,
        None => {
            let dir = project.exports_dir();
            std::fs::create_dir_all(&dir)?;
            dir.join(format!("{}.srt", source_stem(&project)))
        }
    };

    let format = save_subtitles(project.captions.chunks(), &output)?;
    println!(
        "Wrote {} caption(s) as {:?} to {}",
        project.captions.len(),
        format,
        output.display()
    );
    Ok(())
}
