pub mod captions;
pub mod check;
pub mod edit;
pub mod export;
pub mod import;
pub mod info;
pub mod init;
pub mod preview;
pub mod subtitles;
pub mod transcribe;

use std::path::Path;

use reelcap_project_model::{ChunkId, LoadedProject};

pub fn load_project(path: &Path) -> anyhow::Result<LoadedProject> {
    LoadedProject::load(path).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))
}

pub fn save_project(project: &mut LoadedProject) -> anyhow::Result<()> {
    project
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to save project: {e}"))
}

/// Resolve a 1-based caption index as printed by `reelcap captions`.
pub fn chunk_at(project: &LoadedProject, index: usize) -> anyhow::Result<ChunkId> {
    index
        .checked_sub(1)
        .and_then(|i| project.captions.chunks().get(i))
        .map(|chunk| chunk.id)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No caption #{index} (project has {})",
                project.captions.len()
            )
        })
}

/// Base name for files derived from the project's source video.
pub fn source_stem(project: &LoadedProject) -> String {
    project
        .source_path()
        .as_deref()
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .map(|s| s.split('.').next().unwrap_or(s).to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| project.project.name.clone())
}
