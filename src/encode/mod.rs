//! Video sinks.
//!
//! Sinks consume drawn frames together with their [`track::TrackEntry`] slot, in timeline order,
//! and finalize into an in-memory container.

use std::{str::FromStr, time::Duration};

use crate::foundation::error::{AnimatorError, AnimatorResult};

/// MP4 output through the system `ffmpeg`.
pub mod ffmpeg;
/// Animated GIF output.
pub mod gif;
/// Sink trait and the in-memory sink.
pub mod sink;
/// Timed track model.
pub mod track;

/// Container written by the built-in sinks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Gif,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Gif => "gif",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Gif => "image/gif",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AnimatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp4" => Ok(OutputFormat::Mp4),
            "gif" => Ok(OutputFormat::Gif),
            other => Err(AnimatorError::validation(format!(
                "unknown output format '{other}' (expected mp4 or gif)"
            ))),
        }
    }
}

/// Number of whole ticks of a `num/den` Hz clock elapsed at `t`, rounded to nearest.
///
/// Sinks with a fixed frame clock emit `ticks_at(end) - ticks_at(start)` frames per entry, so
/// rounding never accumulates across a track.
pub(crate) fn ticks_at(t: Duration, num: u32, den: u32) -> u64 {
    let den_ns = u128::from(den) * 1_000_000_000;
    let scaled = t.as_nanos() * u128::from(num);
    ((scaled + den_ns / 2) / den_ns) as u64
}

/// Flatten premultiplied RGBA8 over an opaque background color.
pub(crate) fn flatten_premul_over_bg_to_opaque_rgba8(
    dst: &mut [u8],
    src_premul: &[u8],
    bg_rgba: [u8; 4],
) -> AnimatorResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(AnimatorError::validation(
            "flatten_premul_over_bg_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg = [bg_rgba[0] as u16, bg_rgba[1] as u16, bg_rgba[2] as u16];

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            d[c] = (s[c] as u16 + mul_div255(bg[c], inv)).min(255) as u8;
        }
        d[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_premul_alpha_0_returns_bg() {
        let src = vec![0u8, 0, 0, 0];
        let mut dst = vec![0u8; 4];
        flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255]);
    }

    #[test]
    fn flatten_premul_alpha_255_is_identity() {
        let src = vec![1u8, 2, 3, 255];
        let mut dst = vec![0u8; 4];
        flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn ticks_round_to_nearest() {
        // 0.35s at 24fps = 8.4 frames.
        assert_eq!(ticks_at(Duration::from_millis(350), 24, 1), 8);
        assert_eq!(ticks_at(Duration::from_millis(700), 24, 1), 17);
        assert_eq!(ticks_at(Duration::from_secs(2), 30_000, 1001), 60);
        assert_eq!(ticks_at(Duration::from_millis(355), 100, 1), 36);
    }

    #[test]
    fn per_entry_ticks_sum_to_track_total() {
        let step = Duration::from_millis(350);
        let mut start = Duration::ZERO;
        let mut total = 0;
        for _ in 0..37 {
            let end = start + step;
            total += ticks_at(end, 24, 1) - ticks_at(start, 24, 1);
            start = end;
        }
        assert_eq!(total, ticks_at(start, 24, 1));
    }

    #[test]
    fn format_names() {
        assert_eq!("MP4".parse::<OutputFormat>().unwrap(), OutputFormat::Mp4);
        assert_eq!("gif".parse::<OutputFormat>().unwrap().mime(), "image/gif");
        assert!("webm".parse::<OutputFormat>().is_err());
    }
}
