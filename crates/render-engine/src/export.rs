//! Export pipeline: capture captioned frames, then encode against the
//! original audio.
//!
//! ```text
//! Idle -> Capturing -> Encoding -> Complete | Fallback | Failed
//!            \             \
//!             +-------------+--> Cancelled
//! ```
//!
//! Every run ends back in `Idle` with the source unmuted and no encoder
//! alive, whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reelcap_common::clock::{DriftMeasurement, ExportClock, FrameClock};
use reelcap_common::config::ExportDefaults;
use reelcap_common::error::{ReelcapError, ReelcapResult};
use reelcap_common::worker::{CancelHandle, Worker, WorkerContext};
use reelcap_processing_core::timing::active_chunk;
use reelcap_project_model::{is_vertical_source, AspectPreset, CaptionChunk, OutputGeometry, StyleConfig};
use serde::Serialize;

use crate::compositor::{render, FrameParams};
use crate::surface::{FontBook, RasterSurface, VideoFrame};

/// Progress callback for export runs.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Capture lagging real time by more than this is logged.
const DRIFT_WARN_MS: f64 = 250.0;

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    Idle,
    Capturing,
    Encoding,
    Complete,
    Fallback,
    Failed,
    Cancelled,
}

/// Export progress report.
#[derive(Debug, Clone, Serialize)]
pub struct ExportProgress {
    pub state: ExportState,

    /// Progress of the current stage, 0-100.
    pub percent: f64,

    /// Frames captured so far.
    pub frames_captured: u64,

    /// Frames expected for the whole clip.
    pub total_frames: u64,

    /// Estimated seconds remaining in the current stage.
    pub eta_secs: f64,

    pub message: String,
}

/// How the capture loop is clocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePacing {
    /// One frame per frame interval; wall time equals clip duration.
    #[default]
    RealTime,
    /// As fast as frames can be decoded and drawn.
    Unpaced,
}

/// Encoding parameters for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSettings {
    pub fps: u32,
    pub video_bitrate_kbps: u32,
    pub crf: u32,
    pub preset: String,
    pub audio_bitrate_kbps: u32,
    pub pacing: FramePacing,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_defaults(&ExportDefaults::default())
    }
}

impl ExportSettings {
    pub fn from_defaults(defaults: &ExportDefaults) -> Self {
        Self {
            fps: defaults.fps.max(1),
            video_bitrate_kbps: defaults.video_bitrate_kbps,
            crf: defaults.crf,
            preset: defaults.preset.clone(),
            audio_bitrate_kbps: defaults.audio_bitrate_kbps,
            pacing: if defaults.realtime {
                FramePacing::RealTime
            } else {
                FramePacing::Unpaced
            },
        }
    }
}

/// Everything a run needs besides the video source.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub preset: AspectPreset,
    pub crop_value: f64,
    pub style: StyleConfig,
    pub captions: Vec<CaptionChunk>,

    /// Source file read in full as the high-quality audio track.
    pub original_source: Option<PathBuf>,

    pub settings: ExportSettings,
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerFormat {
    Mp4,
    Webm,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Webm => "video/webm",
        }
    }
}

/// A finished video.
#[derive(Clone)]
pub struct ExportArtifact {
    pub format: ContainerFormat,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("format", &self.format)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ExportArtifact {
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    /// `<name>_shorts.<ext>`, where `<name>` is the source file name up to
    /// its first dot (`output` without a usable source name).
    pub fn suggested_file_name(&self, source: Option<&Path>) -> String {
        let stem = source
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("output");
        format!("{stem}_shorts.{}", self.extension())
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> ReelcapResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Terminal result of a run.
#[derive(Debug)]
pub enum ExportOutcome {
    Complete(ExportArtifact),
    /// The preferred container failed; this is the always-playable one.
    Fallback {
        artifact: ExportArtifact,
        message: String,
    },
    Failed(ReelcapError),
    Cancelled,
}

impl ExportOutcome {
    pub fn state(&self) -> ExportState {
        match self {
            ExportOutcome::Complete(_) => ExportState::Complete,
            ExportOutcome::Fallback { .. } => ExportState::Fallback,
            ExportOutcome::Failed(_) => ExportState::Failed,
            ExportOutcome::Cancelled => ExportState::Cancelled,
        }
    }

    pub fn artifact(&self) -> Option<&ExportArtifact> {
        match self {
            ExportOutcome::Complete(artifact) | ExportOutcome::Fallback { artifact, .. } => {
                Some(artifact)
            }
            _ => None,
        }
    }
}

/// The playing clip the capture loop draws from.
pub trait VideoSource: Send {
    /// Decoded frame size.
    fn dimensions(&self) -> (u32, u32);

    fn duration_secs(&self) -> f64;

    fn set_muted(&mut self, muted: bool);

    fn is_muted(&self) -> bool;

    /// Seek to 0 and start playing.
    fn restart(&mut self) -> ReelcapResult<()>;

    /// The frame for the next tick, or `None` once playback has ended.
    fn next_frame(&mut self) -> ReelcapResult<Option<VideoFrame>>;

    /// Stop playback.
    fn stop(&mut self);
}

/// Encoded media captured from the output surface.
#[derive(Debug, Clone, Default)]
pub struct CapturedMedia {
    pub segments: Vec<Vec<u8>>,
}

impl CapturedMedia {
    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate every segment into one buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        for segment in self.segments {
            bytes.extend_from_slice(&segment);
        }
        bytes
    }
}

/// Streaming recorder fed one RGBA frame per tick.
pub trait FrameRecorder: Send {
    fn push_frame(&mut self, rgba: &[u8]) -> ReelcapResult<()>;

    /// Stop recording and hand back everything captured.
    fn finish(self: Box<Self>) -> ReelcapResult<CapturedMedia>;
}

/// Starts a recorder for each run.
pub trait RecorderFactory: Send + Sync {
    fn start(
        &self,
        geometry: OutputGeometry,
        settings: &ExportSettings,
    ) -> ReelcapResult<Box<dyn FrameRecorder>>;
}

/// Input handed to the encoder. Buffers are moved, never copied.
pub struct EncodeRequest {
    pub captured: Vec<u8>,
    pub original_audio: Option<Vec<u8>>,
    pub duration_secs: f64,
    pub settings: ExportSettings,
}

/// Messages from the encoder worker.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderMessage {
    Progress { percent: f64, message: String },
    /// Preferred container (MP4).
    Complete(Vec<u8>),
    /// Alternate container (WebM) plus a warning.
    Fallback { bytes: Vec<u8>, message: String },
    Error(String),
}

/// Encoder side of the worker channel.
pub type EncoderContext = WorkerContext<EncoderMessage>;

/// Progress helper for encoder backends.
pub fn report_encoder_progress(ctx: &EncoderContext, percent: f64, message: impl Into<String>) {
    ctx.send(EncoderMessage::Progress {
        percent: percent.clamp(0.0, 100.0),
        message: message.into(),
    });
}

/// The media encoding collaborator.
pub trait EncodingBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Check if this backend is usable on the system.
    fn is_available(&self) -> bool;

    /// Encode to the preferred container, falling back when it fails.
    ///
    /// Runs on the encoder thread. Progress goes through `ctx`; the return
    /// value is the terminal message. Should return promptly once
    /// `ctx.is_terminated()`.
    fn encode(&self, request: EncodeRequest, ctx: &EncoderContext) -> EncoderMessage;
}

/// Encoder running in its own isolated context.
pub struct EncoderWorker {
    inner: Worker<EncoderMessage>,
}

impl EncoderWorker {
    pub fn spawn(backend: Arc<dyn EncodingBackend>, request: EncodeRequest) -> ReelcapResult<Self> {
        let inner = Worker::spawn("reelcap-encoder", move |ctx: EncoderContext| {
            tracing::info!(
                backend = backend.name(),
                captured_bytes = request.captured.len(),
                has_audio = request.original_audio.is_some(),
                "Encoder started"
            );
            let terminal = backend.encode(request, &ctx);
            ctx.send(terminal);
        })?;
        Ok(Self { inner })
    }

    pub async fn recv(&mut self) -> Option<EncoderMessage> {
        self.inner.recv().await
    }

    pub fn terminate(&mut self) {
        self.inner.terminate();
    }

    pub fn crash_detail(&self) -> String {
        self.inner.crash_detail()
    }
}

/// Drives the compositor against a playing clip and encodes the result.
pub struct ExportPipeline {
    fonts: Arc<FontBook>,
    recorder: Box<dyn RecorderFactory>,
    backend: Arc<dyn EncodingBackend>,
    state: ExportState,
    encoder: Option<EncoderWorker>,
    cancel: CancelHandle,
}

impl ExportPipeline {
    pub fn new(
        fonts: Arc<FontBook>,
        recorder: Box<dyn RecorderFactory>,
        backend: Arc<dyn EncodingBackend>,
    ) -> Self {
        Self {
            fonts,
            recorder,
            backend,
            state: ExportState::Idle,
            encoder: None,
            cancel: CancelHandle::new(),
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub fn is_rendering(&self) -> bool {
        self.state != ExportState::Idle
    }

    /// Whether an encoder from an earlier, abandoned run is still held.
    pub fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    /// Handle that cancels the current (or next) run.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run one export to completion.
    ///
    /// Cancel through [`cancel_handle`](Self::cancel_handle). Dropping the
    /// future instead skips cleanup; the next run tears down whatever
    /// encoder it left behind.
    pub async fn run(
        &mut self,
        video: &mut dyn VideoSource,
        job: &ExportJob,
        progress: Option<ProgressCallback>,
    ) -> ExportOutcome {
        let started = ExportClock::start();
        self.cancel.reset();

        tracing::info!(
            preset = %job.preset,
            fps = job.settings.fps,
            captions = job.captions.len(),
            pacing = ?job.settings.pacing,
            backend = self.backend.name(),
            "Starting export"
        );

        let outcome = self.run_stages(video, job, &progress).await;

        video.stop();
        video.set_muted(false);
        if let Some(mut encoder) = self.encoder.take() {
            encoder.terminate();
        }

        match &outcome {
            ExportOutcome::Complete(artifact) => tracing::info!(
                bytes = artifact.bytes.len(),
                elapsed_secs = started.elapsed_secs(),
                "Export finished"
            ),
            ExportOutcome::Fallback { artifact, message } => tracing::warn!(
                bytes = artifact.bytes.len(),
                message = %message,
                "Export fell back to WebM"
            ),
            ExportOutcome::Failed(err) => tracing::error!(error = %err, "Export failed"),
            ExportOutcome::Cancelled => tracing::info!("Export cancelled"),
        }

        let message = match &outcome {
            ExportOutcome::Complete(_) => "Done".to_string(),
            ExportOutcome::Fallback { message, .. } => message.clone(),
            ExportOutcome::Failed(err) => err.to_string(),
            ExportOutcome::Cancelled => "Cancelled".to_string(),
        };
        self.state = outcome.state();
        emit(&progress, self.state, 100.0, 0, 0, 0.0, message);

        self.state = ExportState::Idle;
        outcome
    }

    async fn run_stages(
        &mut self,
        video: &mut dyn VideoSource,
        job: &ExportJob,
        progress: &Option<ProgressCallback>,
    ) -> ExportOutcome {
        self.state = ExportState::Capturing;
        let captured = match self.capture(video, job, progress).await {
            Ok(Some(captured)) => captured,
            Ok(None) => return ExportOutcome::Cancelled,
            Err(err) => return ExportOutcome::Failed(err),
        };

        self.state = ExportState::Encoding;
        self.encode(captured, video.duration_secs(), job, progress)
            .await
    }

    /// Capture loop. `Ok(None)` when cancelled.
    async fn capture(
        &mut self,
        video: &mut dyn VideoSource,
        job: &ExportJob,
        progress: &Option<ProgressCallback>,
    ) -> ReelcapResult<Option<CapturedMedia>> {
        let geometry = job.preset.export_geometry();
        let (source_w, source_h) = video.dimensions();
        let params = FrameParams {
            is_source_vertical: is_vertical_source(source_w, source_h),
            crop_value: job.crop_value,
            style: &job.style,
        };
        let clock = FrameClock::new(job.settings.fps);
        let total_frames = clock.total_frames(video.duration_secs());

        video.set_muted(true);
        video.restart()?;
        let mut recorder = self.recorder.start(geometry, &job.settings)?;
        let mut surface = RasterSurface::new(geometry.width, geometry.height, Arc::clone(&self.fonts));

        emit(progress, ExportState::Capturing, 0.0, 0, total_frames, 0.0, "Recording");

        let capture_clock = ExportClock::start();
        let epoch = tokio::time::Instant::now();
        let mut frames = 0u64;
        let mut last_time = 0.0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let Some(frame) = video.next_frame()? else {
                break;
            };
            last_time = frame.time_secs;

            let active = active_chunk(frame.time_secs, &job.captions);
            render(&mut surface, Some(&frame), &params, active);
            recorder.push_frame(surface.as_rgba())?;
            frames += 1;

            if frames % clock.fps() as u64 == 0 {
                let fraction = if total_frames > 0 {
                    (frames as f64 / total_frames as f64).min(1.0)
                } else {
                    0.0
                };
                emit(
                    progress,
                    ExportState::Capturing,
                    fraction * 100.0,
                    frames,
                    total_frames,
                    capture_clock.eta_secs(fraction),
                    format!("Recording {:.0}%", fraction * 100.0),
                );
            }

            let cancel = self.cancel.clone();
            match job.settings.pacing {
                FramePacing::RealTime => {
                    let deadline = epoch + clock.frame_interval() * frames as u32;
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = cancel.cancelled() => return Ok(None),
                    }
                }
                FramePacing::Unpaced => tokio::task::yield_now().await,
            }
        }

        if job.settings.pacing == FramePacing::RealTime {
            let drift = DriftMeasurement {
                reference_ns: ExportClock::secs_to_ns(last_time),
                measured_ns: capture_clock.elapsed_ns(),
            };
            if drift.exceeds_threshold_ms(DRIFT_WARN_MS) {
                tracing::warn!(
                    drift_ms = drift.drift_ms(),
                    frames,
                    "Capture drifted from real time"
                );
            }
        }

        let captured = recorder.finish()?;
        tracing::info!(
            frames,
            total_frames,
            segments = captured.segments.len(),
            bytes = captured.len(),
            "Capture finished"
        );

        if frames == 0 || captured.is_empty() {
            return Err(ReelcapError::input("No frames could be captured from the source"));
        }
        Ok(Some(captured))
    }

    async fn encode(
        &mut self,
        captured: CapturedMedia,
        duration_secs: f64,
        job: &ExportJob,
        progress: &Option<ProgressCallback>,
    ) -> ExportOutcome {
        emit(progress, ExportState::Encoding, 0.0, 0, 0, 0.0, "Preparing encoder");

        let original_audio = match &job.original_source {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "Could not read source audio; exporting without it"
                    );
                    None
                }
            },
            None => None,
        };

        if let Some(mut prior) = self.encoder.take() {
            tracing::info!("Tearing down previous encoder");
            prior.terminate();
        }

        let request = EncodeRequest {
            captured: captured.into_bytes(),
            original_audio,
            duration_secs,
            settings: job.settings.clone(),
        };
        let worker = match EncoderWorker::spawn(Arc::clone(&self.backend), request) {
            Ok(worker) => self.encoder.insert(worker),
            Err(err) => return ExportOutcome::Failed(err),
        };

        let cancel = self.cancel.clone();
        let encode_clock = ExportClock::start();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return ExportOutcome::Cancelled,
                message = worker.recv() => match message {
                    Some(EncoderMessage::Progress { percent, message }) => {
                        emit(
                            progress,
                            ExportState::Encoding,
                            percent,
                            0,
                            0,
                            encode_clock.eta_secs(percent / 100.0),
                            message,
                        );
                    }
                    Some(EncoderMessage::Complete(bytes)) => {
                        return ExportOutcome::Complete(ExportArtifact {
                            format: ContainerFormat::Mp4,
                            bytes,
                        });
                    }
                    Some(EncoderMessage::Fallback { bytes, message }) => {
                        return ExportOutcome::Fallback {
                            artifact: ExportArtifact {
                                format: ContainerFormat::Webm,
                                bytes,
                            },
                            message,
                        };
                    }
                    Some(EncoderMessage::Error(message)) => {
                        return ExportOutcome::Failed(ReelcapError::encoding(message));
                    }
                    None => {
                        return ExportOutcome::Failed(ReelcapError::worker_crashed(
                            worker.crash_detail(),
                        ));
                    }
                },
            }
        }
    }
}

fn emit(
    progress: &Option<ProgressCallback>,
    state: ExportState,
    percent: f64,
    frames_captured: u64,
    total_frames: u64,
    eta_secs: f64,
    message: impl Into<String>,
) {
    if let Some(cb) = progress {
        cb(ExportProgress {
            state,
            percent,
            frames_captured,
            total_frames,
            eta_secs,
            message: message.into(),
        });
    }
}
