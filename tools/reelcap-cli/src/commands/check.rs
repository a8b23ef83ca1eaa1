//! Check system capabilities.

use reelcap_common::config::{config_file_path, AppConfig};
use reelcap_project_model::FontFamily;
use reelcap_render_engine::ffmpeg::{command_exists, FfmpegEncoder};
use reelcap_render_engine::{EncodingBackend, FontBook};

pub fn run(config: &AppConfig, init_config: bool) -> anyhow::Result<()> {
    println!("reelcap System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;

    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found");
        } else {
            println!("[MISSING] {binary}: install FFmpeg to import, preview, and export");
            ready = false;
        }
    }

    let encoder = FfmpegEncoder::new();
    if encoder.is_available() {
        println!("[OK] Encoder: {} (H.264/AAC, WebM fallback)", encoder.name());
    }

    let fonts = FontBook::load(&config.fonts);
    for family in FontFamily::ALL {
        if fonts.has_family(family) {
            println!("[OK] Font: {family}");
        } else if fonts.has_glyphs() {
            println!("[WARN] Font: {family} not found, using fallback face");
        } else {
            println!("[MISSING] Font: {family}");
        }
    }
    if !fonts.has_glyphs() {
        println!("     Add a font directory under fonts.dirs in the config file.");
        ready = false;
    }

    match config.transcription.command.as_deref() {
        Some(command) if command_exists(command) => {
            println!("[OK] Recognizer: {command}");
        }
        Some(command) => println!("[WARN] Recognizer: {command} not found on PATH"),
        None => println!(
            "[WARN] Recognizer: not configured (use `reelcap transcribe --from-json`)"
        ),
    }

    let config_path = config_file_path();
    println!();
    if config_path.exists() {
        println!("Config: {}", config_path.display());
        if init_config {
            println!("Config already exists; left unchanged.");
        }
    } else if init_config {
        config.save()?;
        println!("Config: wrote defaults to {}", config_path.display());
    } else {
        println!(
            "Config: defaults in use ({} does not exist, create it with --init-config)",
            config_path.display()
        );
    }

    println!();
    if ready {
        println!("All required capabilities are available. reelcap is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
