//! Show project information.

use std::path::PathBuf;

use super::load_project;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    let project = load_project(&path)?;
    let p = &project.project;

    println!("Project: {}", p.name);
    println!("  ID: {}", p.id);
    println!("  Created: {}", p.created_at);
    println!("  Modified: {}", p.modified_at);
    println!();

    println!("Source:");
    match (&p.source, project.source_path()) {
        (Some(source), Some(resolved)) => {
            println!("  Path: {}", resolved.display());
            println!(
                "  Resolution: {}x{} ({})",
                source.width,
                source.height,
                if source.height > source.width {
                    "vertical"
                } else {
                    "horizontal"
                }
            );
            println!("  Duration: {:.1}s", source.duration_secs);
        }
        _ => println!("  (none attached)"),
    }
    println!();

    let geometry = p.output.preset.export_geometry();
    println!("Output:");
    println!(
        "  Format: {} ({}x{})",
        p.output.preset, geometry.width, geometry.height
    );
    println!("  Crop: {}", p.output.crop_value);
    println!();

    println!("Style:");
    println!("  Font: {} {}px", p.style.font_family, p.style.font_size);
    println!("  Text color: {}", p.style.text_color);
    println!(
        "  Box: {} at {}% opacity",
        p.style.background_color, p.style.background_opacity
    );
    println!("  Position: {}%", p.style.vertical_position_percent);
    println!();

    let covered: f64 = project.captions.iter().map(|c| c.duration()).sum();
    println!("Captions:");
    println!("  Count: {}", project.captions.len());
    println!("  Covered: {covered:.1}s");

    let issues = project.validate_sources();
    if !issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
    }

    Ok(())
}
