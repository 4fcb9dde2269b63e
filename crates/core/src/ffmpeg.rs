//! FFmpeg/FFprobe backed [`VideoDecoder`].
//!
//! `ffprobe` supplies the declared frame count and resolution; `ffmpeg`
//! streams raw RGB24 frames over stdout which are cut into [`RgbImage`]s.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::decoder::{DecodeError, DecodedVideo, VideoDecoder};
use crate::types::Resolution;

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decoder that shells out to the `ffprobe` and `ffmpeg` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
        }
    }
}

impl FfmpegDecoder {
    /// Use explicit binary paths instead of looking them up on `PATH`.
    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Run `ffprobe` on a video file and return the parsed JSON output.
    pub async fn probe(&self, path: &Path) -> Result<FfprobeOutput, DecodeError> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(DecodeError::BinaryNotFound)?;

        if !output.status.success() {
            return Err(DecodeError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| DecodeError::ParseError(format!("{e}: {stdout}")))
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn open(&self, path: &Path) -> Result<Box<dyn DecodedVideo>, DecodeError> {
        if !path.exists() {
            return Err(DecodeError::VideoNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let probe = self.probe(path).await?;
        let resolution = parse_resolution(&probe)
            .ok_or_else(|| DecodeError::ParseError("no video stream with dimensions".into()))?;
        let frame_count = parse_total_frames(&probe);

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DecodeError::BinaryNotFound)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DecodeError::ParseError("ffmpeg stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        tracing::debug!(
            path = %path.display(),
            frame_count,
            width = resolution.width,
            height = resolution.height,
            "Opened video with ffmpeg",
        );

        Ok(Box::new(FfmpegStream {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            frame_count,
            resolution,
            finished: false,
        }))
    }
}

struct FfmpegStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<ChildStderr>,
    frame_count: u32,
    resolution: Resolution,
    finished: bool,
}

impl FfmpegStream {
    fn frame_len(&self) -> usize {
        self.resolution.width as usize * self.resolution.height as usize * 3
    }

    /// Called once stdout is exhausted: a non-zero exit turns into an error.
    async fn finish(&mut self) -> Result<(), DecodeError> {
        self.finished = true;
        let status = self.child.wait().await?;
        if status.success() {
            return Ok(());
        }
        let mut stderr = String::new();
        if let Some(mut pipe) = self.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr).await;
        }
        Err(DecodeError::ExecutionFailed {
            exit_code: status.code(),
            stderr,
        })
    }
}

#[async_trait]
impl DecodedVideo for FfmpegStream {
    fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    async fn read_next(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len()];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {
                let frame = RgbImage::from_raw(self.resolution.width, self.resolution.height, buf)
                    .ok_or_else(|| DecodeError::ParseError("short RGB frame buffer".into()))?;
                Ok(Some(frame))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish().await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait().await;
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    if let Some(secs) = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
    {
        return secs;
    }
    first_video_stream(probe)
        .and_then(|s| s.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse the video framerate from ffprobe output.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_video_stream(probe)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(1.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.parse::<f64>().unwrap_or(0.0),
    }
}

/// Declared frame count, estimated from duration * framerate when the
/// container does not report `nb_frames`.
pub fn parse_total_frames(probe: &FfprobeOutput) -> u32 {
    if let Some(n) = first_video_stream(probe)
        .and_then(|s| s.nb_frames.as_deref())
        .and_then(|nb| nb.parse::<u32>().ok())
    {
        return n;
    }
    let duration = parse_duration(probe);
    let fps = parse_framerate(probe);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as u32;
    }
    0
}

/// First video stream's resolution, if it reports non-zero dimensions.
pub fn parse_resolution(probe: &FfprobeOutput) -> Option<Resolution> {
    let stream = first_video_stream(probe)?;
    match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video_stream(nb_frames: Option<&str>, rate: &str) -> FfprobeStream {
        FfprobeStream {
            codec_type: Some("video".into()),
            width: Some(1920),
            height: Some(1080),
            r_frame_rate: Some(rate.into()),
            duration: Some("60.0".into()),
            nb_frames: nb_frames.map(Into::into),
        }
    }

    #[test]
    fn parse_fraction_handles_ntsc_and_plain() {
        assert!((parse_fraction("24000/1001") - 23.976).abs() < 0.01);
        assert!((parse_fraction("25") - 25.0).abs() < 0.001);
        assert!((parse_fraction("30/0") - 0.0).abs() < 0.001);
    }

    #[test]
    fn total_frames_prefers_nb_frames() {
        let probe = FfprobeOutput {
            streams: vec![video_stream(Some("1800"), "30/1")],
            format: FfprobeFormat { duration: None },
        };
        assert_eq!(parse_total_frames(&probe), 1800);
    }

    #[test]
    fn total_frames_estimated_without_nb_frames() {
        let probe = FfprobeOutput {
            streams: vec![video_stream(None, "25/1")],
            format: FfprobeFormat {
                duration: Some("4.0".into()),
            },
        };
        assert_eq!(parse_total_frames(&probe), 100);
    }

    #[test]
    fn resolution_requires_video_stream() {
        let audio_only = FfprobeOutput {
            streams: vec![FfprobeStream {
                codec_type: Some("audio".into()),
                width: None,
                height: None,
                r_frame_rate: None,
                duration: None,
                nb_frames: None,
            }],
            format: FfprobeFormat { duration: None },
        };
        assert_eq!(parse_resolution(&audio_only), None);

        let probe = FfprobeOutput {
            streams: vec![video_stream(None, "30/1")],
            format: FfprobeFormat { duration: None },
        };
        assert_eq!(parse_resolution(&probe), Some(Resolution::new(1920, 1080)));
    }

    #[tokio::test]
    async fn open_missing_file_is_video_not_found() {
        let decoder = FfmpegDecoder::default();
        let result = decoder.open(Path::new("/definitely/not/here.mp4")).await;
        assert!(matches!(result, Err(DecodeError::VideoNotFound(_))));
    }

    #[tokio::test]
    async fn open_without_binaries_is_binary_not_found() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let decoder = FfmpegDecoder::with_binaries(
            "/nonexistent/bin/ffmpeg",
            "/nonexistent/bin/ffprobe",
        );
        let result = decoder.open(file.path()).await;
        assert!(matches!(result, Err(DecodeError::BinaryNotFound(_))));
    }
}
