//! Initialize a new reelcap project.

use std::path::PathBuf;

use reelcap_common::config::AppConfig;
use reelcap_project_model::LoadedProject;

pub fn run(
    config: &AppConfig,
    name: String,
    output: Option<PathBuf>,
    source: Option<PathBuf>,
) -> anyhow::Result<()> {
    let project_dir = output
        .unwrap_or_else(|| config.projects_dir.clone())
        .join(&name);
    println!("Creating project '{}' at {}", name, project_dir.display());

    let mut project = LoadedProject::create(&project_dir, &name)
        .map_err(|e| anyhow::anyhow!("Failed to create project: {e}"))?;

    println!("Project created successfully:");
    println!("  Directory: {}", project.root.display());
    println!("  ID: {}", project.project.id);
    println!();
    println!("Directory structure:");
    println!("  {}/", name);
    println!("  ├── meta/        (project.json, captions.json)");
    println!("  └── exports/     (rendered clips, subtitles, previews)");

    if let Some(video) = source {
        println!();
        super::import::attach(&mut project, &video)?;
    }

    Ok(())
}
