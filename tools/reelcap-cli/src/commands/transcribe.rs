//! Recognize speech in the source video and rebuild the caption list.

use std::path::PathBuf;
use std::sync::Arc;

use reelcap_audio_ai::{
    normalize_asr_output, AsrOutput, CommandTranscriber, TranscriptionMessage,
    TranscriptionProgress, TranscriptionService,
};
use reelcap_common::config::{config_file_path, AppConfig};

use super::{load_project, save_project};

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    max_words: usize,
    from_json: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut project = load_project(&path)?;

    let transcript = match from_json {
        Some(json_path) => {
            println!("Reading recognizer output from {}", json_path.display());
            let json = std::fs::read_to_string(&json_path)?;
            let output: AsrOutput = serde_json::from_str(&json)?;
            normalize_asr_output(output)
        }
        None => {
            let source = project.source_path().ok_or_else(|| {
                anyhow::anyhow!("No source video attached. Run `reelcap import` first.")
            })?;
            let transcriber =
                CommandTranscriber::from_settings(&config.transcription).ok_or_else(|| {
                    anyhow::anyhow!(
                        "No recognizer configured. Set transcription.command in {} or pass --from-json.",
                        config_file_path().display()
                    )
                })?;

            println!("Transcribing {}", source.display());
            let progress: TranscriptionProgress =
                Box::new(|message: &TranscriptionMessage| match message {
                    TranscriptionMessage::Loading { message }
                    | TranscriptionMessage::Processing { message } => println!("  {message}"),
                    TranscriptionMessage::Downloading { percent } => {
                        print!("\r  Downloading model: {percent}%  ")
                    }
                    _ => {}
                });

            let mut service = TranscriptionService::new(Arc::new(transcriber));
            service.transcribe_file(source, Some(progress)).await?
        }
    };

    if transcript.is_no_speech() {
        println!("No speech detected. Captions cleared.");
    }

    project.captions.replace_all(transcript.into_chunks(max_words));
    save_project(&mut project)?;

    println!(
        "{} caption(s) saved (max {} words each).",
        project.captions.len(),
        max_words.max(1)
    );
    Ok(())
}
