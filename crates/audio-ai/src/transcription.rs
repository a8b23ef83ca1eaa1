//! Speech recognition plumbing.
//!
//! The recognizer itself is a black box behind [`Transcriber`]. This module
//! decodes the source to mono 16 kHz PCM, runs the recognizer in an isolated
//! worker, and normalizes what comes back into transcript spans.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use reelcap_common::config::TranscriptionSettings;
use reelcap_common::error::{ReelcapError, ReelcapResult};
use reelcap_common::worker::{Worker, WorkerContext};
use reelcap_processing_core::{segment, RawSpan};
use reelcap_project_model::CaptionChunk;
use serde::{Deserialize, Serialize};

/// Sample rate the recognizer expects.
pub const SAMPLE_RATE: u32 = 16_000;

const RECOGNIZER_POLL: Duration = Duration::from_millis(50);

/// One timed span in recognizer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrChunk {
    /// `[start, end]`; the end is `null` when the recognizer could not place it.
    pub timestamp: (f64, Option<f64>),
    pub text: String,
}

/// Raw recognizer output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AsrOutput {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub chunks: Vec<AsrChunk>,
}

/// A finished recognition pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Transcript {
    Spans(Vec<RawSpan>),
    /// The recognizer ran fine and heard nothing.
    NoSpeech,
}

impl Transcript {
    pub fn is_no_speech(&self) -> bool {
        matches!(self, Transcript::NoSpeech)
    }

    /// Segment into caption chunks. Empty for [`Transcript::NoSpeech`].
    pub fn into_chunks(self, max_words: usize) -> Vec<CaptionChunk> {
        match self {
            Transcript::Spans(spans) => segment(&spans, max_words),
            Transcript::NoSpeech => Vec::new(),
        }
    }
}

/// Trim texts, drop blank spans, and fall back to the full text as one
/// open-ended span when no timed span survives.
pub fn normalize_asr_output(output: AsrOutput) -> Transcript {
    let spans: Vec<RawSpan> = output
        .chunks
        .into_iter()
        .filter_map(|chunk| {
            let text = chunk.text.trim();
            if text.is_empty() {
                return None;
            }
            // A zero end is as good as missing.
            let end = chunk.timestamp.1.filter(|end| *end != 0.0);
            Some(RawSpan::new(chunk.timestamp.0, end, text))
        })
        .collect();

    if !spans.is_empty() {
        return Transcript::Spans(spans);
    }

    let text = output.text.trim();
    if text.is_empty() {
        Transcript::NoSpeech
    } else {
        Transcript::Spans(vec![RawSpan::new(0.0, None, text)])
    }
}

/// Decode the audio of `path` to mono 16 kHz `f32` samples.
pub fn decode_pcm_mono_16k(path: &Path) -> ReelcapResult<Vec<f32>> {
    if !path.exists() {
        return Err(ReelcapError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-vn", "-ac", "1", "-ar"])
        .arg(SAMPLE_RATE.to_string())
        .args(["-f", "f32le", "pipe:1"])
        .stdin(Stdio::null())
        .output()
        .map_err(|e| ReelcapError::input(format!("Failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        return Err(ReelcapError::input(format!(
            "Audio format not supported: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let samples = pcm_from_le_bytes(&output.stdout);
    if samples.is_empty() {
        return Err(ReelcapError::input(format!(
            "No audio track in {}",
            path.display()
        )));
    }

    tracing::info!(
        path = %path.display(),
        samples = samples.len(),
        duration_secs = samples.len() as f64 / SAMPLE_RATE as f64,
        "Decoded audio"
    );
    Ok(samples)
}

/// Interpret raw bytes as little-endian `f32` samples. A trailing partial
/// sample is ignored.
pub fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Messages from the recognition worker, in send order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TranscriptionMessage {
    Loading { message: String },
    Downloading { percent: u8 },
    Processing { message: String },
    Complete { output: AsrOutput },
    Error { message: String },
}

/// Recognizer side of the worker channel.
pub type TranscriptionContext = WorkerContext<TranscriptionMessage>;

/// Observer for non-terminal worker messages.
pub type TranscriptionProgress = Box<dyn Fn(&TranscriptionMessage) + Send>;

/// The speech-recognition collaborator.
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize one mono 16 kHz buffer.
    ///
    /// Runs on the worker thread; status updates go through `ctx`. Should
    /// return promptly once `ctx.is_terminated()`.
    fn transcribe(&self, pcm: Vec<f32>, ctx: &TranscriptionContext) -> ReelcapResult<AsrOutput>;
}

/// Runs an external recognizer command.
///
/// The command reads little-endian `f32` PCM on stdin and prints one JSON
/// document (`{"text": ..., "chunks": [{"timestamp": [s, e], "text": ...}]}`)
/// on stdout. Status lines on stderr of the form `downloading <percent>` and
/// `processing` are forwarded; everything else is kept for error reports.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    command: String,
    args: Vec<String>,
}

impl CommandTranscriber {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// `None` when no recognizer command is configured.
    pub fn from_settings(settings: &TranscriptionSettings) -> Option<Self> {
        settings
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(|command| Self::new(command, settings.args.clone()))
    }
}

impl Transcriber for CommandTranscriber {
    fn name(&self) -> &str {
        &self.command
    }

    fn transcribe(&self, pcm: Vec<f32>, ctx: &TranscriptionContext) -> ReelcapResult<AsrOutput> {
        ctx.send(TranscriptionMessage::Loading {
            message: format!("Starting {}", self.command),
        });

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReelcapError::inference(format!("Failed to start {}: {e}", self.command))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelcapError::inference("Failed to open recognizer stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelcapError::inference("Failed to capture recognizer stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelcapError::inference("Failed to capture recognizer stderr"))?;

        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            let mut buf = Vec::with_capacity(4096 * 4);
            for block in pcm.chunks(4096) {
                buf.clear();
                for sample in block {
                    buf.extend_from_slice(&sample.to_le_bytes());
                }
                stdin.write_all(&buf)?;
            }
            Ok(())
        });

        let stdout_task = std::thread::spawn(move || -> std::io::Result<String> {
            let mut output = String::new();
            BufReader::new(stdout).read_to_string(&mut output)?;
            Ok(output)
        });

        let status_ctx = ctx.clone();
        let stderr_task = std::thread::spawn(move || -> Vec<String> {
            let mut other = Vec::new();
            for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                match parse_status_line(&line) {
                    Some(message) => {
                        status_ctx.send(message);
                    }
                    None => other.push(line),
                }
            }
            other
        });

        let status = loop {
            if ctx.is_terminated() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ReelcapError::inference("Transcription cancelled"));
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(RECOGNIZER_POLL),
                Err(e) => {
                    return Err(ReelcapError::inference(format!(
                        "Failed to wait on recognizer: {e}"
                    )));
                }
            }
        };

        // The recognizer may exit without draining stdin.
        if let Ok(Err(err)) = writer.join() {
            tracing::debug!(error = %err, "Recognizer stopped reading PCM early");
        }
        let stderr_lines = stderr_task.join().unwrap_or_default();
        let stdout = match stdout_task.join() {
            Ok(Ok(stdout)) => stdout,
            Ok(Err(err)) => {
                return Err(ReelcapError::inference(format!(
                    "Failed to read recognizer output: {err}"
                )));
            }
            Err(_) => return Err(ReelcapError::inference("Recognizer output reader panicked")),
        };

        if !status.success() {
            let tail = stderr_lines
                .iter()
                .rev()
                .take(5)
                .rev()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            return Err(ReelcapError::inference(format!(
                "{} exited with {status}: {tail}",
                self.command
            )));
        }

        serde_json::from_str(stdout.trim()).map_err(|e| {
            ReelcapError::inference(format!("Unreadable recognizer output: {e}"))
        })
    }
}

fn parse_status_line(line: &str) -> Option<TranscriptionMessage> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("downloading") {
        let percent = rest.trim().trim_end_matches('%').parse::<f64>().ok()?;
        return Some(TranscriptionMessage::Downloading {
            percent: percent.clamp(0.0, 100.0).round() as u8,
        });
    }
    if line == "processing" {
        return Some(TranscriptionMessage::Processing {
            message: "Analyzing audio".to_string(),
        });
    }
    None
}

/// Recognizer running in its own isolated context.
pub struct TranscriptionWorker {
    inner: Worker<TranscriptionMessage>,
}

impl TranscriptionWorker {
    pub fn spawn(transcriber: Arc<dyn Transcriber>, pcm: Vec<f32>) -> ReelcapResult<Self> {
        let inner = Worker::spawn("reelcap-asr", move |ctx: TranscriptionContext| {
            tracing::info!(
                transcriber = transcriber.name(),
                samples = pcm.len(),
                "Transcription started"
            );
            let terminal = match transcriber.transcribe(pcm, &ctx) {
                Ok(output) => TranscriptionMessage::Complete { output },
                Err(ReelcapError::Inference { message }) => TranscriptionMessage::Error { message },
                Err(err) => TranscriptionMessage::Error {
                    message: err.to_string(),
                },
            };
            ctx.send(terminal);
        })?;
        Ok(Self { inner })
    }

    pub async fn recv(&mut self) -> Option<TranscriptionMessage> {
        self.inner.recv().await
    }

    pub fn terminate(&mut self) {
        self.inner.terminate();
    }

    pub fn crash_detail(&self) -> String {
        self.inner.crash_detail()
    }
}

/// Owns the single active recognition worker.
pub struct TranscriptionService {
    transcriber: Arc<dyn Transcriber>,
    worker: Option<TranscriptionWorker>,
}

impl TranscriptionService {
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            transcriber,
            worker: None,
        }
    }

    /// Whether a worker from an abandoned pass is still held.
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Run one recognition pass over `pcm`. Any prior worker is terminated
    /// first.
    pub async fn transcribe(
        &mut self,
        pcm: Vec<f32>,
        progress: Option<TranscriptionProgress>,
    ) -> ReelcapResult<Transcript> {
        if let Some(mut prior) = self.worker.take() {
            tracing::info!("Terminating previous transcription");
            prior.terminate();
        }

        let worker = self
            .worker
            .insert(TranscriptionWorker::spawn(Arc::clone(&self.transcriber), pcm)?);

        let result = loop {
            match worker.recv().await {
                Some(TranscriptionMessage::Complete { output }) => {
                    break Ok(normalize_asr_output(output));
                }
                Some(TranscriptionMessage::Error { message }) => {
                    break Err(ReelcapError::inference(message));
                }
                Some(status) => {
                    tracing::debug!(status = ?status, "Transcription status");
                    if let Some(cb) = &progress {
                        cb(&status);
                    }
                }
                None => break Err(ReelcapError::worker_crashed(worker.crash_detail())),
            }
        };

        if let Some(mut worker) = self.worker.take() {
            worker.terminate();
        }

        match &result {
            Ok(Transcript::Spans(spans)) => {
                tracing::info!(spans = spans.len(), "Transcription finished")
            }
            Ok(Transcript::NoSpeech) => tracing::warn!("No speech detected"),
            Err(err) => tracing::error!(error = %err, "Transcription failed"),
        }
        result
    }

    /// Decode `path` and run one recognition pass over its audio.
    pub async fn transcribe_file(
        &mut self,
        path: impl Into<PathBuf>,
        progress: Option<TranscriptionProgress>,
    ) -> ReelcapResult<Transcript> {
        let path = path.into();
        let pcm = tokio::task::spawn_blocking(move || decode_pcm_mono_16k(&path))
            .await
            .map_err(|e| ReelcapError::input(format!("Audio decode task failed: {e}")))??;
        self.transcribe(pcm, progress).await
    }
}
