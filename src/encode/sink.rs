use crate::{
    compose::surface::FrameRGBA,
    encode::{
        OutputFormat,
        ffmpeg::FfmpegSink,
        gif::GifSink,
        track::{TrackCursor, TrackEntry},
    },
    foundation::{
        core::Fps,
        error::{AnimatorError, AnimatorResult},
    },
};

/// Configuration provided to a [`VideoSink`] before the first frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    /// Frame clock for sinks that need one.
    pub fps: Fps,
    /// Background used to flatten any transparency (straight RGBA8).
    pub bg_rgba: [u8; 4],
}

impl SinkConfig {
    pub fn new(width: u32, height: u32, fps: Fps) -> Self {
        Self {
            width,
            height,
            fps,
            bg_rgba: [0, 0, 0, 255],
        }
    }

    pub(crate) fn check_frame(&self, frame: &FrameRGBA) -> AnimatorResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(AnimatorError::assembly(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        if frame.data.len() != (self.width as usize) * (self.height as usize) * 4 {
            return Err(AnimatorError::assembly(
                "frame.data size mismatch with width*height*4",
            ));
        }
        Ok(())
    }
}

/// Consumes timed frames and produces one encoded container.
///
/// Ordering contract: `push_frame` receives entries in track order, each starting exactly where
/// the previous one ended. Sinks reject anything else.
pub trait VideoSink: Send {
    /// Called once before any frames are pushed.
    fn begin(&mut self, cfg: SinkConfig) -> AnimatorResult<()>;
    /// Push one frame for the given track slot.
    fn push_frame(&mut self, entry: &TrackEntry, frame: &FrameRGBA) -> AnimatorResult<()>;
    /// Finalize and return the container bytes.
    fn end(&mut self) -> AnimatorResult<Vec<u8>>;
}

/// Creates a fresh sink per assembly run.
pub trait SinkFactory: Send + Sync {
    fn create_sink(&self) -> AnimatorResult<Box<dyn VideoSink>>;
    fn extension(&self) -> &'static str;
    fn mime(&self) -> &'static str;
}

impl SinkFactory for OutputFormat {
    fn create_sink(&self) -> AnimatorResult<Box<dyn VideoSink>> {
        let sink: Box<dyn VideoSink> = match self {
            OutputFormat::Mp4 => Box::new(FfmpegSink::new()),
            OutputFormat::Gif => Box::new(GifSink::new()),
        };
        Ok(sink)
    }

    fn extension(&self) -> &'static str {
        OutputFormat::extension(*self)
    }

    fn mime(&self) -> &'static str {
        OutputFormat::mime(*self)
    }
}

/// Sink that keeps every frame in memory. `end` returns the track entries as JSON.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    cursor: TrackCursor,
    frames: Vec<(TrackEntry, FrameRGBA)>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    pub fn frames(&self) -> &[(TrackEntry, FrameRGBA)] {
        &self.frames
    }
}

impl VideoSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> AnimatorResult<()> {
        self.cfg = Some(cfg);
        self.cursor = TrackCursor::default();
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, entry: &TrackEntry, frame: &FrameRGBA) -> AnimatorResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| AnimatorError::assembly("in-memory sink not started"))?;
        cfg.check_frame(frame)?;
        self.cursor.advance(entry)?;
        self.frames.push((entry.clone(), frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> AnimatorResult<Vec<u8>> {
        if self.cfg.take().is_none() {
            return Err(AnimatorError::assembly("in-memory sink not started"));
        }
        let entries: Vec<&TrackEntry> = self.frames.iter().map(|(e, _)| e).collect();
        let json = serde_json::to_vec(&entries).map_err(anyhow::Error::from)?;
        Ok(json)
    }
}

/// [`SinkFactory`] producing [`InMemorySink`]s; useful where no encoder is wanted.
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemorySinkFactory;

impl SinkFactory for InMemorySinkFactory {
    fn create_sink(&self) -> AnimatorResult<Box<dyn VideoSink>> {
        Ok(Box::new(InMemorySink::new()))
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn mime(&self) -> &'static str {
        "application/json"
    }
}
