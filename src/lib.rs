//! Animate NASA GIBS satellite layers around a picked location into two videos.
//!
//! One "Create Animation" action runs the whole pipeline:
//!
//! - plan one WMS `GetMap` request per (layer group, month) with [`plan_requests`]
//! - fetch them through a bounded pool with [`BatchFetcher`]
//! - composite and encode an all-layers video and a snow-vs-NDVI comparison with [`Assembler`]
//!
//! [`Animator`] wires these together and owns the run state.
#![forbid(unsafe_code)]

/// Video assembly of fetched frames.
pub mod assemble;
/// Frame compositing.
pub mod compose;
/// Runtime configuration.
pub mod config;
/// Monthly date expansion.
pub mod dates;
/// Video sinks and the timed track.
pub mod encode;
/// Tile fetching.
pub mod fetch;
/// Core value types and errors.
pub mod foundation {
    /// Value types shared across the pipeline.
    pub mod core;
    /// Error type.
    pub mod error;
}
/// Web-Mercator projection.
pub mod geo;
/// Layer groups and their catalog.
pub mod layers;
/// Shared loading indicator.
pub mod loading;
/// Orchestration of the full action.
pub mod orchestrator;
/// WMS request planning.
pub mod plan;

pub use crate::assemble::{Assembler, Assembly, COMPARISON_GROUPS};
pub use crate::compose::frames::{Compositor, pair_by_date};
pub use crate::compose::legend::LegendRegistry;
pub use crate::compose::surface::{FrameRGBA, contain_fit};
pub use crate::compose::text::TextPainter;
pub use crate::config::{AnimatorConfig, DeliveryPolicy, Labels, Timings};
pub use crate::dates::{monthly_date_strings, monthly_dates};
pub use crate::encode::OutputFormat;
pub use crate::encode::ffmpeg::{FfmpegSink, is_ffmpeg_on_path};
pub use crate::encode::gif::GifSink;
pub use crate::encode::sink::{InMemorySink, InMemorySinkFactory, SinkConfig, SinkFactory, VideoSink};
pub use crate::encode::track::{TimedTrack, TrackEntry};
pub use crate::fetch::{
    BatchFetcher, FetchConfig, FetchPolicy, FetchReport, FetchSchedule, Frame, HttpTileSource,
    TileSource,
};
pub use crate::foundation::core::{Canvas, Fps, GeoPoint, YearRange};
pub use crate::foundation::error::{AnimatorError, AnimatorResult};
pub use crate::geo::{MercatorBBox, lon_lat_to_mercator_bbox};
pub use crate::layers::{LayerCatalog, LayerGroup, LayerSpec};
pub use crate::loading::{LoadingFlag, LoadingGuard};
pub use crate::orchestrator::{
    AnimationOutputs, AnimationState, Animator, AssemblyKind, AssemblyOutcome, VideoBlob,
};
pub use crate::plan::{TileRequest, get_map_url, plan_requests};

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    /// Solid-color PNG of the given size.
    pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Resampling may shift channels by a few levels; compare with tolerance.
    #[track_caller]
    pub fn assert_rgb_near(px: [u8; 4], rgb: [u8; 3]) {
        for (got, want) in px.iter().zip(rgb) {
            assert!(
                got.abs_diff(want) <= 4,
                "pixel {px:?} not within tolerance of {rgb:?}"
            );
        }
    }
}
