use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use image::{
    Delay, RgbaImage,
    codecs::gif::{GifEncoder, Repeat},
};

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

/// GIF delays are expressed in centiseconds.
const GIF_TICKS_PER_SEC: u32 = 100;

/// NeuQuant sampling factor (1 best, 30 fastest).
const QUANTIZER_SPEED: i32 = 10;

/// Looping animated GIF sink. One GIF frame per track entry, with the delay rounded so the
/// running total always matches the track.
#[derive(Default)]
pub struct GifSink {
    encoder: Option<GifEncoder<SharedBuf>>,
    buf: SharedBuf,
    cfg: Option<SinkConfig>,
    cursor: TrackCursor,
    ticks_written: u64,
}

impl GifSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoSink for GifSink {
    fn begin(&mut self, cfg: SinkConfig) -> AnimatorResult<()> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(AnimatorError::validation(
                "gif sink width/height must be non-zero",
            ));
        }
        if cfg.width > u32::from(u16::MAX) || cfg.height > u32::from(u16::MAX) {
            return Err(AnimatorError::validation(
                "gif sink width/height must fit in 16 bits",
            ));
        }

        self.buf = SharedBuf::default();
        let mut encoder = GifEncoder::new_with_speed(self.buf.clone(), QUANTIZER_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| AnimatorError::assembly(format!("gif set_repeat failed: {e}")))?;

        self.encoder = Some(encoder);
        self.cfg = Some(cfg);
        self.cursor = TrackCursor::default();
        self.ticks_written = 0;
        Ok(())
    }

    fn push_frame(&mut self, entry: &TrackEntry, frame: &FrameRGBA) -> AnimatorResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| AnimatorError::assembly("gif sink not started"))?;
        cfg.check_frame(frame)?;
        self.cursor.advance(entry)?;

        let target = ticks_at(entry.end(), GIF_TICKS_PER_SEC, 1);
        let centis = target.saturating_sub(self.ticks_written);
        if centis == 0 {
            tracing::debug!(label = %entry.label, "entry shorter than one centisecond, skipped");
            return Ok(());
        }

        let mut rgba = vec![0u8; frame.data.len()];
        if frame.premultiplied {
            flatten_premul_over_bg_to_opaque_rgba8(&mut rgba, &frame.data, cfg.bg_rgba)?;
        } else {
            rgba.copy_from_slice(&frame.data);
        }
        let img = RgbaImage::from_raw(cfg.width, cfg.height, rgba)
            .ok_or_else(|| AnimatorError::assembly("gif frame buffer has unexpected size"))?;

        let delay_ms = u32::try_from(centis * 10)
            .map_err(|_| AnimatorError::assembly("gif frame delay overflow"))?;
        let gif_frame =
            image::Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(delay_ms, 1));

        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| AnimatorError::assembly("gif sink is already finalized"))?;
        encoder
            .encode_frame(gif_frame)
            .map_err(|e| AnimatorError::assembly(format!("gif encode failed: {e}")))?;
        self.ticks_written = target;
        Ok(())
    }

    fn end(&mut self) -> AnimatorResult<Vec<u8>> {
        let encoder = self
            .encoder
            .take()
            .ok_or_else(|| AnimatorError::assembly("gif sink not started"))?;
        self.cfg = None;
        // The trailer is written when the encoder is dropped.
        drop(encoder);

        if self.ticks_written == 0 {
            return Err(AnimatorError::assembly("gif sink received no frames"));
        }
        let bytes = self.buf.take()?;
        tracing::debug!(centis = self.ticks_written, bytes = bytes.len(), "gif finished");
        Ok(bytes)
    }
}

/// `Write` handle over a shared buffer so the bytes survive the encoder.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn take(&self) -> AnimatorResult<Vec<u8>> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| AnimatorError::assembly("gif buffer lock poisoned"))?;
        Ok(std::mem::take(&mut *guard))
    }
}

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        let mut guard = self
            .0
            .lock()
            .map_err(|_| std::io::Error::other("gif buffer lock poisoned"))?;
        guard.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, time::Duration};

    use image::AnimationDecoder as _;
    use image::codecs::gif::GifDecoder;

    use super::*;
    use crate::{encode::track::TimedTrack, foundation::core::Fps};

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> FrameRGBA {
        FrameRGBA {
            width: w,
            height: h,
            data: rgba.repeat((w * h) as usize),
            premultiplied: true,
        }
    }

    #[test]
    fn encodes_looping_gif_with_track_delays() {
        let mut sink = GifSink::new();
        sink.begin(SinkConfig::new(8, 6, Fps::default())).unwrap();

        let mut track = TimedTrack::new();
        let plan = [
            (2000, [17, 17, 17, 255]),
            (350, [255, 0, 0, 255]),
            (350, [0, 255, 0, 255]),
            (355, [0, 0, 255, 255]),
        ];
        for (i, (ms, color)) in plan.iter().enumerate() {
            let e = track
                .append(Duration::from_millis(*ms), format!("f{i}"))
                .unwrap();
            sink.push_frame(&e, &solid(8, 6, *color)).unwrap();
        }
        let bytes = sink.end().unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");

        let frames = GifDecoder::new(Cursor::new(bytes))
            .unwrap()
            .into_frames()
            .collect_frames()
            .unwrap();
        assert_eq!(frames.len(), 4);

        let delays_ms: Vec<u32> = frames
            .iter()
            .map(|f| {
                let (n, d) = f.delay().numer_denom_ms();
                n / d
            })
            .collect();
        // 3055ms total rounds to 306cs, so the last frame absorbs the extra centisecond.
        assert_eq!(delays_ms, vec![2000, 350, 350, 360]);

        let px = frames[1].buffer().get_pixel(3, 3);
        assert!(px[0] > 200 && px[1] < 50 && px[2] < 50);
    }

    #[test]
    fn end_without_frames_fails() {
        let mut sink = GifSink::new();
        sink.begin(SinkConfig::new(4, 4, Fps::default())).unwrap();
        assert!(sink.end().is_err());
    }

    #[test]
    fn rejects_discontiguous_entries() {
        let mut sink = GifSink::new();
        sink.begin(SinkConfig::new(4, 4, Fps::default())).unwrap();
        let late = TrackEntry {
            start: Duration::from_millis(10),
            duration: Duration::from_millis(100),
            label: "late".into(),
        };
        let err = sink.push_frame(&late, &solid(4, 4, [0, 0, 0, 255])).unwrap_err();
        assert!(matches!(err, AnimatorError::Assembly(_)));
    }
}
