//! List captions.

use std::path::PathBuf;

use reelcap_project_model::ChunkId;
use serde::Serialize;

use super::load_project;

#[derive(Serialize)]
struct CaptionRow<'a> {
    index: usize,
    id: ChunkId,
    start: f64,
    end: f64,
    text: &'a str,
}

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let project = load_project(&path)?;

    let rows: Vec<CaptionRow<'_>> = project
        .captions
        .iter()
        .enumerate()
        .map(|(i, chunk)| CaptionRow {
            index: i + 1,
            id: chunk.id,
            start: chunk.start,
            end: chunk.end,
            text: &chunk.text,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No captions. Run `reelcap transcribe` first.");
        return Ok(());
    }

    for row in &rows {
        println!(
            "{:>4}  {:>7.2} - {:>7.2}  {}",
            row.index, row.start, row.end, row.text
        );
    }
    println!("\n{} caption(s)", rows.len());
    Ok(())
}
