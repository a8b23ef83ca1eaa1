//! Subtitle files in SRT and VTT formats.

use std::path::Path;

use reelcap_common::error::ReelcapResult;
use reelcap_project_model::CaptionChunk;

/// Subtitle file flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    Vtt,
}

impl SubtitleFormat {
    /// `.vtt` selects VTT; anything else is SRT.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("vtt") => SubtitleFormat::Vtt,
            _ => SubtitleFormat::Srt,
        }
    }

    pub fn render(&self, chunks: &[CaptionChunk]) -> String {
        match self {
            SubtitleFormat::Srt => generate_srt(chunks),
            SubtitleFormat::Vtt => generate_vtt(chunks),
        }
    }
}

/// Generate numbered SRT content, one entry per chunk in list order.
pub fn generate_srt(chunks: &[CaptionChunk]) -> String {
    let mut output = String::new();

    for (i, chunk) in chunks.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(chunk.start, ','),
            format_timestamp(chunk.end, ','),
        ));
        output.push_str(&chunk.text);
        output.push_str("\n\n");
    }

    output
}

/// Generate WebVTT content.
pub fn generate_vtt(chunks: &[CaptionChunk]) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for chunk in chunks {
        output.push_str(&format!(
            "{} --> {}\n",
            format_timestamp(chunk.start, '.'),
            format_timestamp(chunk.end, '.'),
        ));
        output.push_str(&chunk.text);
        output.push_str("\n\n");
    }

    output
}

/// `HH:MM:SS<sep>mmm`, milliseconds truncated toward zero.
fn format_timestamp(secs: f64, separator: char) -> String {
    let total_ms = (secs.max(0.0) * 1000.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}{separator}{millis:03}")
}

/// Write subtitles, picking the format from the file extension.
pub fn save_subtitles(chunks: &[CaptionChunk], path: &Path) -> ReelcapResult<SubtitleFormat> {
    let format = SubtitleFormat::from_path(path);
    std::fs::write(path, format.render(chunks))?;
    tracing::info!(path = %path.display(), entries = chunks.len(), format = ?format, "Saved subtitles");
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srt_generation() {
        let chunks = vec![
            CaptionChunk::new(0.0, 2.5, "Hello world"),
            CaptionChunk::new(3.0, 5.0, "This is a test"),
        ];

        let srt = generate_srt(&chunks);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:02,500\nHello world\n\n\
             2\n00:00:03,000 --> 00:00:05,000\nThis is a test\n\n"
        );
    }

    #[test]
    fn test_vtt_generation() {
        let chunks = vec![CaptionChunk::new(61.5, 63.0, "One minute in")];

        let vtt = generate_vtt(&chunks);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:01:01.500 --> 00:01:03.000\nOne minute in"));
    }

    #[test]
    fn test_timestamp_truncates_milliseconds() {
        assert_eq!(format_timestamp(0.0, ','), "00:00:00,000");
        assert_eq!(format_timestamp(3661.5, ','), "01:01:01,500");
        assert_eq!(format_timestamp(1.2349, ','), "00:00:01,234");
        assert_eq!(format_timestamp(59.9999, '.'), "00:00:59.999");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(SubtitleFormat::from_path(Path::new("a.vtt")), SubtitleFormat::Vtt);
        assert_eq!(SubtitleFormat::from_path(Path::new("a.VTT")), SubtitleFormat::Vtt);
        assert_eq!(SubtitleFormat::from_path(Path::new("a.srt")), SubtitleFormat::Srt);
        assert_eq!(SubtitleFormat::from_path(Path::new("captions")), SubtitleFormat::Srt);
    }

    #[test]
    fn test_save_subtitles_writes_file() {
        let dir = std::env::temp_dir().join(format!("reelcap_test_subtitles_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("clip.vtt");

        let format = save_subtitles(&[CaptionChunk::new(0.0, 1.0, "hi")], &path).unwrap();
        assert_eq!(format, SubtitleFormat::Vtt);
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("WEBVTT"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
