//! ffmpeg-backed collaborators: source decoding, frame recording, and the
//! final MP4 encode.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use reelcap_common::error::{ReelcapError, ReelcapResult};
use reelcap_project_model::OutputGeometry;
use serde::Deserialize;

use crate::export::{
    report_encoder_progress, CapturedMedia, EncodeRequest, EncoderContext, EncoderMessage,
    EncodingBackend, ExportPipeline, ExportSettings, FrameRecorder, RecorderFactory, VideoSource,
};
use crate::surface::{FontBook, VideoFrame};

/// Size of the segments the recorder reads from ffmpeg.
const SEGMENT_BYTES: usize = 256 * 1024;

/// Poll interval while waiting on the encoder process.
const ENCODER_POLL: Duration = Duration::from_millis(50);

/// Check whether a binary is on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Stream facts read with ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe the first video stream of `path`.
pub fn probe_video(path: &Path) -> ReelcapResult<VideoProbe> {
    if !path.exists() {
        return Err(ReelcapError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height,duration:format=duration",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| ReelcapError::unsupported(format!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(ReelcapError::input(format!(
            "Could not read {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| ReelcapError::input(format!("No video stream in {}", path.display())))
}

fn parse_probe(json: &str) -> Option<VideoProbe> {
    let parsed: ProbeOutput = serde_json::from_str(json).ok()?;
    let stream = parsed.streams.first()?;
    let width = stream.width.filter(|w| *w > 0)?;
    let height = stream.height.filter(|h| *h > 0)?;
    let duration_secs = parsed
        .format
        .and_then(|f| f.duration)
        .or_else(|| stream.duration.clone())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)?;
    Some(VideoProbe {
        width,
        height,
        duration_secs,
    })
}

/// The source clip, decoded by ffmpeg to RGBA at the export frame rate.
pub struct FfmpegVideoSource {
    path: PathBuf,
    probe: VideoProbe,
    fps: u32,
    child: Option<Child>,
    stdout: Option<BufReader<ChildStdout>>,
    frame_index: u64,
    muted: bool,
}

impl FfmpegVideoSource {
    pub fn open(path: impl Into<PathBuf>, fps: u32) -> ReelcapResult<Self> {
        let path = path.into();
        let probe = probe_video(&path)?;
        tracing::info!(
            path = %path.display(),
            width = probe.width,
            height = probe.height,
            duration_secs = probe.duration_secs,
            "Opened source video"
        );
        Ok(Self {
            path,
            probe,
            fps: fps.max(1),
            child: None,
            stdout: None,
            frame_index: 0,
            muted: false,
        })
    }

    pub fn probe(&self) -> VideoProbe {
        self.probe
    }

    /// Decode the single frame at `time_secs` (for stills and previews).
    pub fn frame_at(&self, time_secs: f64) -> ReelcapResult<VideoFrame> {
        let output = Command::new("ffmpeg")
            .args(["-v", "error", "-ss"])
            .arg(format!("{:.3}", time_secs.max(0.0)))
            .arg("-i")
            .arg(&self.path)
            .args(["-frames:v", "1", "-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .output()
            .map_err(|e| ReelcapError::unsupported(format!("Failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(ReelcapError::input(format!(
                "Could not decode frame at {time_secs:.2}s: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        VideoFrame::from_rgba(time_secs, self.probe.width, self.probe.height, output.stdout)
            .ok_or_else(|| ReelcapError::input(format!("No frame at {time_secs:.2}s")))
    }
}

impl VideoSource for FfmpegVideoSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.probe.width, self.probe.height)
    }

    fn duration_secs(&self) -> f64 {
        self.probe.duration_secs
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }

    fn restart(&mut self) -> ReelcapResult<()> {
        self.stop();

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(&self.path)
            .args(["-an", "-vf"])
            .arg(format!("fps={}", self.fps))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ReelcapError::input(format!("Failed to start ffmpeg decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelcapError::input("Failed to capture decoder stdout"))?;

        tracing::debug!(pid = child.id(), fps = self.fps, "Decoder started");
        self.stdout = Some(BufReader::with_capacity(
            (self.probe.width * self.probe.height * 4) as usize,
            stdout,
        ));
        self.child = Some(child);
        self.frame_index = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> ReelcapResult<Option<VideoFrame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut data = vec![0u8; (self.probe.width * self.probe.height * 4) as usize];
        match stdout.read_exact(&mut data) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.stop();
                return Ok(None);
            }
            Err(err) => {
                return Err(ReelcapError::input(format!("Decoder read failed: {err}")));
            }
        }

        let time_secs = self.frame_index as f64 / self.fps as f64;
        self.frame_index += 1;
        Ok(VideoFrame::from_rgba(
            time_secs,
            self.probe.width,
            self.probe.height,
            data,
        ))
    }

    fn stop(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for FfmpegVideoSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts [`FfmpegFrameRecorder`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegRecorderFactory;

impl RecorderFactory for FfmpegRecorderFactory {
    fn start(
        &self,
        geometry: OutputGeometry,
        settings: &ExportSettings,
    ) -> ReelcapResult<Box<dyn FrameRecorder>> {
        Ok(Box::new(FfmpegFrameRecorder::start(geometry, settings)?))
    }
}

/// Raw RGBA frames in, VP8 WebM segments out.
pub struct FfmpegFrameRecorder {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<std::io::Result<Vec<Vec<u8>>>>>,
}

impl FfmpegFrameRecorder {
    pub fn start(geometry: OutputGeometry, settings: &ExportSettings) -> ReelcapResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-f", "rawvideo", "-pix_fmt", "rgba", "-s"])
            .arg(format!("{}x{}", geometry.width, geometry.height))
            .arg("-r")
            .arg(settings.fps.to_string())
            .args(["-i", "pipe:0", "-c:v", "libvpx", "-b:v"])
            .arg(format!("{}k", settings.video_bitrate_kbps))
            .args(["-deadline", "realtime", "-cpu-used", "8", "-f", "webm", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ReelcapError::encoding(format!("Failed to start recorder: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelcapError::encoding("Failed to open recorder stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelcapError::encoding("Failed to capture recorder stdout"))?;

        // Drain stdout concurrently so ffmpeg never blocks on a full pipe.
        let reader = std::thread::Builder::new()
            .name("reelcap-recorder".to_string())
            .spawn(move || -> std::io::Result<Vec<Vec<u8>>> {
                let mut segments = Vec::new();
                loop {
                    let mut segment = vec![0u8; SEGMENT_BYTES];
                    let read = stdout.read(&mut segment)?;
                    if read == 0 {
                        break;
                    }
                    segment.truncate(read);
                    segments.push(segment);
                }
                Ok(segments)
            })
            .map_err(|e| ReelcapError::encoding(format!("Failed to start recorder reader: {e}")))?;

        tracing::debug!(
            pid = child.id(),
            width = geometry.width,
            height = geometry.height,
            bitrate_kbps = settings.video_bitrate_kbps,
            "Recorder started"
        );

        Ok(Self {
            child,
            stdin: Some(stdin),
            reader: Some(reader),
        })
    }
}

impl FrameRecorder for FfmpegFrameRecorder {
    fn push_frame(&mut self, rgba: &[u8]) -> ReelcapResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ReelcapError::encoding("Recorder already finished"))?;
        stdin
            .write_all(rgba)
            .map_err(|e| ReelcapError::encoding(format!("Recorder rejected frame: {e}")))
    }

    fn finish(mut self: Box<Self>) -> ReelcapResult<CapturedMedia> {
        // Closing stdin ends the stream.
        drop(self.stdin.take());

        let segments = match self.reader.take().map(|handle| handle.join()) {
            Some(Ok(Ok(segments))) => segments,
            Some(Ok(Err(err))) => {
                return Err(ReelcapError::encoding(format!("Recorder output failed: {err}")));
            }
            Some(Err(_)) | None => {
                return Err(ReelcapError::encoding("Recorder reader stopped unexpectedly"));
            }
        };

        let status = self
            .child
            .wait()
            .map_err(|e| ReelcapError::encoding(format!("Failed to wait on recorder: {e}")))?;
        if !status.success() {
            return Err(ReelcapError::encoding(format!("Recorder exited with {status}")));
        }

        Ok(CapturedMedia { segments })
    }
}

impl Drop for FfmpegFrameRecorder {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            drop(self.stdin.take());
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// WebM + original audio to H.264/AAC MP4.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEncoder;

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self
    }

    fn encode_mp4(
        &self,
        request: &EncodeRequest,
        work_dir: &Path,
        ctx: &EncoderContext,
    ) -> Result<Vec<u8>, String> {
        let video_path = work_dir.join("input.webm");
        let audio_path = work_dir.join("input_audio");
        let output_path = work_dir.join("output.mp4");

        report_encoder_progress(ctx, 0.0, "Preparing files");
        std::fs::write(&video_path, &request.captured)
            .map_err(|e| format!("writing captured video: {e}"))?;
        if let Some(audio) = &request.original_audio {
            std::fs::write(&audio_path, audio).map_err(|e| format!("writing source audio: {e}"))?;
        }

        let args = mp4_args(
            &video_path,
            request.original_audio.as_ref().map(|_| audio_path.as_path()),
            &output_path,
            &request.settings,
        );
        tracing::debug!(args = ?args, "Running ffmpeg");

        report_encoder_progress(ctx, 0.0, "Converting to MP4");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to start ffmpeg: {e}"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "failed to capture ffmpeg stdout".to_string())?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| "failed to capture ffmpeg stderr".to_string())?;

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let progress_ctx = ctx.clone();
        let duration_secs = request.duration_secs;
        let progress_task = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            let mut state = ProgressState::default();
            for line in reader.lines().map_while(Result::ok) {
                if let Some((key, value)) = line.trim().split_once('=') {
                    state.update(key, value);
                    if key == "progress" {
                        let (percent, message) = state.report(duration_secs);
                        report_encoder_progress(&progress_ctx, percent, message);
                    }
                }
            }
        });

        let status = loop {
            if ctx.is_terminated() {
                let _ = child.kill();
                let _ = child.wait();
                let _ = progress_task.join();
                return Err("terminated".to_string());
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => std::thread::sleep(ENCODER_POLL),
                Err(e) => return Err(format!("failed to wait on ffmpeg: {e}")),
            }
        };

        let _ = progress_task.join();
        let stderr_output = stderr_task
            .join()
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(format!("ffmpeg exited with {status}: {}", stderr_output.trim()));
        }

        report_encoder_progress(ctx, 99.0, "Writing file");
        std::fs::read(&output_path).map_err(|e| format!("reading output: {e}"))
    }
}

impl EncodingBackend for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        command_exists("ffmpeg")
    }

    fn encode(&self, request: EncodeRequest, ctx: &EncoderContext) -> EncoderMessage {
        let work_dir = std::env::temp_dir().join(format!(
            "reelcap-encode-{}-{}",
            std::process::id(),
            work_dir_nonce()
        ));
        let result = std::fs::create_dir_all(&work_dir)
            .map_err(|e| format!("creating work dir: {e}"))
            .and_then(|_| self.encode_mp4(&request, &work_dir, ctx));

        if let Err(err) = std::fs::remove_dir_all(&work_dir) {
            tracing::debug!(path = %work_dir.display(), error = %err, "Failed to clean encoder work dir");
        }

        match result {
            Ok(bytes) => EncoderMessage::Complete(bytes),
            Err(_) if ctx.is_terminated() => EncoderMessage::Error("Encoding cancelled".to_string()),
            Err(reason) if request.captured.is_empty() => EncoderMessage::Error(reason),
            Err(reason) => {
                tracing::warn!(reason = %reason, "MP4 conversion failed, falling back to WebM");
                EncoderMessage::Fallback {
                    bytes: request.captured,
                    message: format!(
                        "MP4 conversion failed ({reason}). Saving as WebM instead."
                    ),
                }
            }
        }
    }
}

fn work_dir_nonce() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

/// Arguments for the MP4 conversion. The audio map is optional so a source
/// without an audio stream still produces a video-only file.
fn mp4_args(
    video: &Path,
    audio: Option<&Path>,
    output: &Path,
    settings: &ExportSettings,
) -> Vec<String> {
    let mut args: Vec<String> = ["-y", "-v", "error", "-nostats", "-progress", "pipe:1", "-i"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    args.push(video.display().to_string());
    if let Some(audio) = audio {
        args.push("-i".to_string());
        args.push(audio.display().to_string());
    }
    args.extend(
        [
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            settings.preset.clone(),
            "-crf".to_string(),
            settings.crf.to_string(),
        ]
        .into_iter(),
    );
    if audio.is_some() {
        args.extend(
            [
                "-c:a",
                "aac",
                "-b:a",
                &format!("{}k", settings.audio_bitrate_kbps),
                "-map",
                "0:v:0",
                "-map",
                "1:a:0?",
                "-shortest",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    args.push("-pix_fmt".to_string());
    args.push("yuv420p".to_string());
    args.push(output.display().to_string());
    args
}

#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            "out_time_ms" => {
                if let Ok(ms) = value.parse::<f64>() {
                    self.out_time_secs = ms / 1_000_000.0;
                }
            }
            "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn report(&self, expected_duration_secs: f64) -> (f64, String) {
        if self.complete {
            return (99.0, "Finalizing".to_string());
        }
        let percent = if expected_duration_secs <= 0.0 {
            0.0
        } else {
            (self.out_time_secs / expected_duration_secs * 100.0).clamp(0.0, 99.0)
        };
        (percent, format!("Converting: {percent:.0}%"))
    }
}

impl ExportPipeline {
    /// Pipeline wired to ffmpeg for recording and encoding.
    pub fn with_ffmpeg(fonts: Arc<FontBook>) -> Self {
        Self::new(fonts, Box::new(FfmpegRecorderFactory), Arc::new(FfmpegEncoder::new()))
    }
}
