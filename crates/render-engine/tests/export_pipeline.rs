//! Export pipeline runs against in-memory collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgba, RgbaImage};
use reelcap_common::error::ReelcapResult;
use reelcap_project_model::{AspectPreset, CaptionChunk, OutputGeometry, StyleConfig};
use reelcap_render_engine::{
    report_encoder_progress, CapturedMedia, ContainerFormat, EncodeRequest, EncoderContext,
    EncoderMessage, EncodingBackend, ExportJob, ExportOutcome, ExportPipeline, ExportProgress,
    ExportSettings, ExportState, FontBook, FramePacing, FrameRecorder, ProgressCallback,
    RecorderFactory, VideoFrame, VideoSource,
};

struct FakeVideo {
    width: u32,
    height: u32,
    duration_secs: f64,
    fps: u32,
    index: u64,
    muted: bool,
    stopped: bool,
}

impl FakeVideo {
    fn new(duration_secs: f64, fps: u32) -> Self {
        Self {
            width: 64,
            height: 36,
            duration_secs,
            fps,
            index: 0,
            muted: false,
            stopped: false,
        }
    }
}

impl VideoSource for FakeVideo {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn restart(&mut self) -> ReelcapResult<()> {
        self.index = 0;
        self.stopped = false;
        Ok(())
    }

    fn next_frame(&mut self) -> ReelcapResult<Option<VideoFrame>> {
        let time = self.index as f64 / self.fps as f64;
        if self.stopped || time >= self.duration_secs {
            return Ok(None);
        }
        self.index += 1;
        let image = RgbaImage::from_pixel(self.width, self.height, Rgba([0, 128, 255, 255]));
        Ok(Some(VideoFrame::new(time, image)))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Records one byte per frame so tests can count what was captured.
#[derive(Default)]
struct CountingRecorderFactory {
    frames: Arc<Mutex<Vec<usize>>>,
}

struct CountingRecorder {
    frames: Arc<Mutex<Vec<usize>>>,
    data: Vec<u8>,
}

impl RecorderFactory for CountingRecorderFactory {
    fn start(
        &self,
        geometry: OutputGeometry,
        _settings: &ExportSettings,
    ) -> ReelcapResult<Box<dyn FrameRecorder>> {
        assert_eq!((geometry.width, geometry.height), (720, 1280));
        Ok(Box::new(CountingRecorder {
            frames: Arc::clone(&self.frames),
            data: Vec::new(),
        }))
    }
}

impl FrameRecorder for CountingRecorder {
    fn push_frame(&mut self, rgba: &[u8]) -> ReelcapResult<()> {
        self.frames.lock().unwrap().push(rgba.len());
        self.data.push(1);
        Ok(())
    }

    fn finish(self: Box<Self>) -> ReelcapResult<CapturedMedia> {
        Ok(CapturedMedia {
            segments: vec![self.data],
        })
    }
}

enum Script {
    Complete,
    Fallback,
    Panic,
    BlockUntilTerminated,
}

struct ScriptedBackend {
    script: Script,
    saw_audio: Arc<AtomicBool>,
    saw_termination: Arc<AtomicBool>,
}

impl ScriptedBackend {
    fn new(script: Script) -> Self {
        Self {
            script,
            saw_audio: Arc::new(AtomicBool::new(false)),
            saw_termination: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EncodingBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn encode(&self, request: EncodeRequest, ctx: &EncoderContext) -> EncoderMessage {
        self.saw_audio
            .store(request.original_audio.is_some(), Ordering::SeqCst);
        match self.script {
            Script::Complete => {
                report_encoder_progress(ctx, 50.0, "Converting");
                EncoderMessage::Complete(b"mp4".to_vec())
            }
            Script::Fallback => EncoderMessage::Fallback {
                bytes: request.captured,
                message: "MP4 conversion failed (test). Saving as WebM instead.".to_string(),
            },
            Script::Panic => panic!("allocation failed"),
            Script::BlockUntilTerminated => {
                while !ctx.is_terminated() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                self.saw_termination.store(true, Ordering::SeqCst);
                EncoderMessage::Error("terminated".to_string())
            }
        }
    }
}

fn job(captions: Vec<CaptionChunk>) -> ExportJob {
    ExportJob {
        preset: AspectPreset::Vertical,
        crop_value: 50.0,
        style: StyleConfig::default(),
        captions,
        original_source: None,
        settings: ExportSettings {
            fps: 4,
            pacing: FramePacing::Unpaced,
            ..ExportSettings::default()
        },
    }
}

fn pipeline(backend: Arc<dyn EncodingBackend>) -> (ExportPipeline, Arc<Mutex<Vec<usize>>>) {
    let factory = CountingRecorderFactory::default();
    let frames = Arc::clone(&factory.frames);
    let pipeline = ExportPipeline::new(Arc::new(FontBook::empty()), Box::new(factory), backend);
    (pipeline, frames)
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..500 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_export_completes_without_audio() {
    let backend = Arc::new(ScriptedBackend::new(Script::Complete));
    let saw_audio = Arc::clone(&backend.saw_audio);
    let (mut pipeline, frames) = pipeline(backend);
    let mut video = FakeVideo::new(5.0, 4);

    let mut job = job(vec![CaptionChunk::new(0.0, 2.0, "hello there")]);
    job.original_source = Some("/nonexistent/reelcap/source.mp4".into());

    let states = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&states);
    let progress: ProgressCallback =
        Box::new(move |p: ExportProgress| seen.lock().unwrap().push(p.state));

    let outcome = pipeline.run(&mut video, &job, Some(progress)).await;

    let artifact = match &outcome {
        ExportOutcome::Complete(artifact) => artifact,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(artifact.format, ContainerFormat::Mp4);
    assert_eq!(artifact.bytes, b"mp4");
    assert!(!saw_audio.load(Ordering::SeqCst));

    let frames = frames.lock().unwrap();
    assert_eq!(frames.len(), 20);
    assert!(frames.iter().all(|len| *len == 720 * 1280 * 4));

    let states = states.lock().unwrap();
    assert_eq!(states.first(), Some(&ExportState::Capturing));
    assert!(states.contains(&ExportState::Encoding));
    assert_eq!(states.last(), Some(&ExportState::Complete));

    assert!(!pipeline.is_rendering());
    assert!(!pipeline.has_encoder());
    assert!(!video.is_muted());
}

#[tokio::test]
async fn test_cancel_during_encoding_restores_idle() {
    let backend = Arc::new(ScriptedBackend::new(Script::BlockUntilTerminated));
    let saw_termination = Arc::clone(&backend.saw_termination);
    let (mut pipeline, _) = pipeline(backend);
    let mut video = FakeVideo::new(1.0, 4);

    let cancel = pipeline.cancel_handle();
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| {
        if p.state == ExportState::Encoding {
            cancel.cancel();
        }
    });

    let outcome = pipeline.run(&mut video, &job(Vec::new()), Some(progress)).await;

    assert!(matches!(outcome, ExportOutcome::Cancelled));
    assert_eq!(outcome.state(), ExportState::Cancelled);
    assert!(!pipeline.is_rendering());
    assert!(!pipeline.has_encoder());
    assert!(!video.is_muted());
    assert!(wait_for(&saw_termination).await);
}

#[tokio::test]
async fn test_cancel_during_capture_stops_recording() {
    let backend = Arc::new(ScriptedBackend::new(Script::Complete));
    let (mut pipeline, frames) = pipeline(backend);
    let mut video = FakeVideo::new(10.0, 4);

    let cancel = pipeline.cancel_handle();
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| {
        if p.state == ExportState::Capturing && p.frames_captured >= 4 {
            cancel.cancel();
        }
    });

    let outcome = pipeline.run(&mut video, &job(Vec::new()), Some(progress)).await;

    assert!(matches!(outcome, ExportOutcome::Cancelled));
    assert!(frames.lock().unwrap().len() < 40);
    assert!(!video.is_muted());
}

#[tokio::test]
async fn test_panicking_encoder_reports_resource_exhaustion() {
    let backend = Arc::new(ScriptedBackend::new(Script::Panic));
    let (mut pipeline, _) = pipeline(backend);
    let mut video = FakeVideo::new(1.0, 4);

    let outcome = pipeline.run(&mut video, &job(Vec::new()), None).await;

    match outcome {
        ExportOutcome::Failed(err) => {
            assert!(err.is_resource_exhaustion());
            assert!(err.to_string().contains("shorter clip"));
            assert!(err.to_string().contains("allocation failed"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!pipeline.is_rendering());
}

#[tokio::test]
async fn test_fallback_keeps_captured_webm() {
    let backend = Arc::new(ScriptedBackend::new(Script::Fallback));
    let (mut pipeline, _) = pipeline(backend);
    let mut video = FakeVideo::new(2.0, 4);

    let outcome = pipeline.run(&mut video, &job(Vec::new()), None).await;

    match &outcome {
        ExportOutcome::Fallback { artifact, message } => {
            assert_eq!(artifact.format, ContainerFormat::Webm);
            assert_eq!(artifact.bytes.len(), 8);
            assert!(message.contains("Saving as WebM"));
            assert_eq!(
                artifact.suggested_file_name(Some(std::path::Path::new("/clips/talk.final.mov"))),
                "talk_shorts.webm"
            );
        }
        other => panic!("expected fallback, got {other:?}"),
    }
    assert_eq!(outcome.state(), ExportState::Fallback);
}

#[tokio::test]
async fn test_abandoned_run_encoder_is_torn_down_by_next_run() {
    let blocking = Arc::new(ScriptedBackend::new(Script::BlockUntilTerminated));
    let saw_termination = Arc::clone(&blocking.saw_termination);
    let (mut pipeline, _) = pipeline(blocking);
    let mut video = FakeVideo::new(1.0, 4);
    let job = job(Vec::new());

    let encoding = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&encoding);
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| {
        if p.state == ExportState::Encoding {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let reached = tokio::select! {
        outcome = pipeline.run(&mut video, &job, Some(progress)) => {
            panic!("run should still be encoding, got {outcome:?}")
        }
        reached = wait_for(&encoding) => reached,
    };
    assert!(reached);
    assert!(pipeline.has_encoder());
    assert!(!saw_termination.load(Ordering::SeqCst));

    // The second run cancels straight away; it still has to clear the leftover.
    let cancel = pipeline.cancel_handle();
    let progress: ProgressCallback = Box::new(move |p: ExportProgress| {
        if p.state == ExportState::Encoding {
            cancel.cancel();
        }
    });
    let outcome = pipeline.run(&mut video, &job, Some(progress)).await;

    assert!(matches!(outcome, ExportOutcome::Cancelled));
    assert!(!pipeline.has_encoder());
    assert!(wait_for(&saw_termination).await);
}

#[tokio::test]
async fn test_realtime_pacing_takes_clip_duration() {
    let backend = Arc::new(ScriptedBackend::new(Script::Complete));
    let (mut pipeline, frames) = pipeline(backend);
    let mut video = FakeVideo::new(0.5, 10);

    let mut job = job(Vec::new());
    job.settings.fps = 10;
    job.settings.pacing = FramePacing::RealTime;

    let started = std::time::Instant::now();
    let outcome = pipeline.run(&mut video, &job, None).await;

    assert!(matches!(outcome, ExportOutcome::Complete(_)));
    assert_eq!(frames.lock().unwrap().len(), 5);
    assert!(started.elapsed() >= Duration::from_millis(450));
}
