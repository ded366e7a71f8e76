use std::{
    io::{Read, Write as _},
    process::{Child, ChildStdin, Command, Stdio},
};

use anyhow::Context as _;
use tempfile::NamedTempFile;

use crate::{
    compose::surface::FrameRGBA,
    encode::{
        flatten_premul_over_bg_to_opaque_rgba8,
        sink::{SinkConfig, VideoSink},
        ticks_at,
        track::{TrackCursor, TrackEntry},
    },
    foundation::error::{AnimatorError, AnimatorResult},
};

/// H.264 MP4 sink that spawns the system `ffmpeg` and streams raw frames to its stdin.
///
/// Each track entry is repeated for as many frames of the fixed clock as it covers. The
/// container is written to a temporary file and read back by [`VideoSink::end`].
#[derive(Default)]
pub struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    output: Option<NamedTempFile>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    cursor: TrackCursor,
    frames_written: u64,
}

impl FfmpegSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written to `ffmpeg` so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl VideoSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> AnimatorResult<()> {
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(AnimatorError::validation("fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(AnimatorError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(AnimatorError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }
        if !is_ffmpeg_on_path() {
            return Err(AnimatorError::assembly(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let output = tempfile::Builder::new()
            .prefix("gibs-animator-")
            .suffix(".mp4")
            .tempfile()
            .context("create temporary mp4 output")?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            // For rawvideo input `-r` before `-i` sets the input frame rate.
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-f",
            "mp4",
        ]);
        cmd.arg(output.path());

        let mut child = cmd.spawn().map_err(|e| {
            AnimatorError::assembly(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AnimatorError::assembly("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AnimatorError::assembly("failed to open ffmpeg stderr"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::debug!(
            width = cfg.width,
            height = cfg.height,
            fps = cfg.fps.as_f64(),
            "ffmpeg started"
        );

        self.scratch = vec![0u8; (cfg.width as usize) * (cfg.height as usize) * 4];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.output = Some(output);
        self.cfg = Some(cfg);
        self.cursor = TrackCursor::default();
        self.frames_written = 0;
        Ok(())
    }

    fn push_frame(&mut self, entry: &TrackEntry, frame: &FrameRGBA) -> AnimatorResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| AnimatorError::assembly("ffmpeg sink not started"))?;
        cfg.check_frame(frame)?;
        self.cursor.advance(entry)?;

        let target = ticks_at(entry.end(), cfg.fps.num, cfg.fps.den);
        let repeats = target.saturating_sub(self.frames_written);
        if repeats == 0 {
            tracing::debug!(label = %entry.label, "entry shorter than one frame, skipped");
            return Ok(());
        }

        if frame.premultiplied {
            flatten_premul_over_bg_to_opaque_rgba8(&mut self.scratch, &frame.data, cfg.bg_rgba)?;
        } else {
            self.scratch.copy_from_slice(&frame.data);
        }

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(AnimatorError::assembly("ffmpeg sink is already finalized"));
        };
        for _ in 0..repeats {
            stdin.write_all(&self.scratch).map_err(|e| {
                AnimatorError::assembly(format!("failed to write frame to ffmpeg stdin: {e}"))
            })?;
        }
        self.frames_written = target;
        Ok(())
    }

    fn end(&mut self) -> AnimatorResult<Vec<u8>> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| AnimatorError::assembly("ffmpeg sink not started"))?;

        let status = child.wait().map_err(|e| {
            AnimatorError::assembly(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| AnimatorError::assembly("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| AnimatorError::assembly(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        self.cfg = None;
        let output = self.output.take();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(AnimatorError::assembly(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        let output =
            output.ok_or_else(|| AnimatorError::assembly("ffmpeg output file missing"))?;
        let bytes = std::fs::read(output.path()).context("read encoded mp4")?;
        if bytes.is_empty() {
            return Err(AnimatorError::assembly("ffmpeg produced an empty file"));
        }
        tracing::debug!(frames = self.frames_written, bytes = bytes.len(), "ffmpeg finished");
        Ok(bytes)
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{encode::track::TimedTrack, foundation::core::Fps};

    #[test]
    fn odd_dimensions_are_rejected_before_spawning() {
        let mut sink = FfmpegSink::new();
        let err = sink
            .begin(SinkConfig::new(101, 100, Fps::default()))
            .unwrap_err();
        assert!(matches!(err, AnimatorError::Validation(_)));
    }

    #[test]
    fn push_before_begin_fails() {
        let mut sink = FfmpegSink::new();
        let frame = FrameRGBA {
            width: 2,
            height: 2,
            data: vec![0; 16],
            premultiplied: true,
        };
        let mut track = TimedTrack::new();
        let e = track.append(Duration::from_secs(1), "x").unwrap();
        assert!(sink.push_frame(&e, &frame).is_err());
        assert!(sink.end().is_err());
    }

    #[test]
    fn encodes_track_with_cumulative_frame_count() {
        if !is_ffmpeg_on_path() {
            return;
        }
        let (w, h) = (32, 18);
        let frame = FrameRGBA {
            width: w,
            height: h,
            data: [40u8, 80, 120, 255].repeat((w * h) as usize),
            premultiplied: true,
        };
        let mut sink = FfmpegSink::new();
        sink.begin(SinkConfig::new(w, h, Fps::default())).unwrap();

        let mut track = TimedTrack::new();
        for label in ["title", "a", "b", "c"] {
            let dur = if label == "title" { 2000 } else { 350 };
            let e = track.append(Duration::from_millis(dur), label).unwrap();
            sink.push_frame(&e, &frame).unwrap();
        }
        // 3.05s at 24fps
        assert_eq!(sink.frames_written(), 73);

        let bytes = sink.end().unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[4..8], b"ftyp");
    }
}
