//! Runtime configuration, loadable from JSON. Every field has a default.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;

use crate::{
    encode::{OutputFormat, track::secs_to_duration},
    fetch::FetchConfig,
    foundation::{
        core::{Canvas, Fps},
        error::{AnimatorError, AnimatorResult},
    },
    layers::{LayerCatalog, LayerGroup},
};

pub const DEFAULT_WMS_ENDPOINT: &str = "https://gibs.earthdata.nasa.gov/wms/epsg3857/best/wms.cgi";

/// Whether one failed assembly discards the other's result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Any assembly failure fails the whole run.
    #[default]
    AllOrNothing,
    /// Deliver whichever videos succeeded; fail only when none did.
    Partial,
}

/// User-facing strings drawn on cards. Supplied from outside, never localized here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Labels {
    pub intro_title: String,
    pub intro_subtitle: String,
    pub layer_heading: String,
    pub comparison_title: String,
}

impl Default for Labels {
    fn default() -> Self {
        AnimatorConfig::default().labels()
    }
}

/// How long each kind of track entry is held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    pub intro: Duration,
    pub title: Duration,
    pub frame: Duration,
    pub comparison_title: Duration,
    pub comparison_frame: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            intro: Duration::from_secs(2),
            title: Duration::from_millis(1500),
            frame: Duration::from_secs(1),
            comparison_title: Duration::from_secs(2),
            comparison_frame: Duration::from_millis(350),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnimatorConfig {
    /// WMS `GetMap` endpoint serving `EPSG:3857`.
    pub wms_endpoint: String,
    /// Output video size in pixels.
    pub canvas: Canvas,
    /// Height of the label strip at the bottom of content frames.
    pub footer_height: u32,
    /// Frame clock of the MP4 encoder.
    pub fps: Fps,
    pub format: OutputFormat,

    /// Seconds each monthly frame is held in the all-layers video.
    pub frame_seconds: f64,
    pub intro_seconds: f64,
    /// Seconds each layer-group title card is held.
    pub title_seconds: f64,
    pub comparison_title_seconds: f64,
    /// Seconds each side-by-side frame is held in the comparison video.
    pub comparison_frame_seconds: f64,

    pub fetch: FetchConfig,
    pub delivery: DeliveryPolicy,

    /// Large line of the intro card.
    pub intro_title: String,
    /// Smaller line under the intro title.
    pub intro_subtitle: String,
    /// Heading drawn above the group name on layer title cards.
    pub layer_heading: String,
    /// Title card text of the comparison video.
    pub comparison_title: String,

    /// Layer groups to animate and the base overlays requested with them.
    pub catalog: LayerCatalog,
    /// Legend image per group. Groups without an entry get no legend.
    pub legends: BTreeMap<LayerGroup, PathBuf>,
    /// Extra `.ttf`/`.otf`/`.ttc` files for card and footer text.
    pub fonts_dir: Option<PathBuf>,
}

impl Default for AnimatorConfig {
    fn default() -> Self {
        Self {
            wms_endpoint: DEFAULT_WMS_ENDPOINT.to_string(),
            canvas: Canvas::default(),
            footer_height: 140,
            fps: Fps::default(),
            format: OutputFormat::default(),
            frame_seconds: 1.0,
            intro_seconds: 2.0,
            title_seconds: 1.5,
            comparison_title_seconds: 2.0,
            comparison_frame_seconds: 0.35,
            fetch: FetchConfig::default(),
            delivery: DeliveryPolicy::default(),
            intro_title: "A.D.A".to_string(),
            intro_subtitle: "(Astronomical Data Animator)".to_string(),
            layer_heading: "Layer".to_string(),
            comparison_title: "Snow vs NDVI".to_string(),
            catalog: LayerCatalog::gibs_default(),
            legends: BTreeMap::new(),
            fonts_dir: None,
        }
    }
}

impl AnimatorConfig {
    pub fn from_json_str(s: &str) -> AnimatorResult<Self> {
        let cfg: Self = serde_json::from_str(s).context("parse animator config json")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a JSON config. Relative legend and font paths resolve against the file's directory.
    pub fn from_json_file(path: &Path) -> AnimatorResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let mut cfg = Self::from_json_str(&text)?;
        if let Some(base) = path.parent() {
            cfg.resolve_paths(base);
        }
        Ok(cfg)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for p in self.legends.values_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        if let Some(dir) = self.fonts_dir.as_mut()
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
    }

    pub fn validate(&self) -> AnimatorResult<()> {
        if self.wms_endpoint.trim().is_empty() {
            return Err(AnimatorError::validation("wms_endpoint must not be empty"));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(AnimatorError::validation("canvas width/height must be non-zero"));
        }
        if self.format == OutputFormat::Mp4
            && (!self.canvas.width.is_multiple_of(2) || !self.canvas.height.is_multiple_of(2))
        {
            return Err(AnimatorError::validation(
                "canvas width/height must be even for mp4 output",
            ));
        }
        if self.footer_height >= self.canvas.height {
            return Err(AnimatorError::validation(format!(
                "footer_height {} must be smaller than canvas height {}",
                self.footer_height, self.canvas.height
            )));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        self.timings()?;
        self.fetch.validate()?;
        self.catalog.validate()?;
        Ok(())
    }

    pub fn timings(&self) -> AnimatorResult<Timings> {
        Ok(Timings {
            intro: secs_to_duration(self.intro_seconds)?,
            title: secs_to_duration(self.title_seconds)?,
            frame: secs_to_duration(self.frame_seconds)?,
            comparison_title: secs_to_duration(self.comparison_title_seconds)?,
            comparison_frame: secs_to_duration(self.comparison_frame_seconds)?,
        })
    }

    pub fn labels(&self) -> Labels {
        Labels {
            intro_title: self.intro_title.clone(),
            intro_subtitle: self.intro_subtitle.clone(),
            layer_heading: self.layer_heading.clone(),
            comparison_title: self.comparison_title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchPolicy;

    #[test]
    fn defaults_are_valid() {
        let cfg = AnimatorConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.timings().unwrap(), Timings::default());
        assert_eq!(cfg.fetch.concurrency, 15);
        assert_eq!(cfg.labels().comparison_title, "Snow vs NDVI");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = AnimatorConfig::from_json_str(
            r#"{
                "canvas": { "width": 640, "height": 360 },
                "footer_height": 48,
                "fetch": { "policy": "collect_errors" },
                "delivery": "partial",
                "legends": { "ndvi": "legends/ndvi.png" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.canvas.width, 640);
        assert_eq!(cfg.fetch.policy, FetchPolicy::CollectErrors);
        assert_eq!(cfg.fetch.concurrency, 15);
        assert_eq!(cfg.delivery, DeliveryPolicy::Partial);
        assert_eq!(
            cfg.legends.get(&LayerGroup::Ndvi),
            Some(&PathBuf::from("legends/ndvi.png"))
        );
        assert_eq!(cfg.intro_title, "A.D.A");
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            r#"{ "canvas": { "width": 0, "height": 360 } }"#,
            r#"{ "canvas": { "width": 641, "height": 360 } }"#,
            r#"{ "footer_height": 1080 }"#,
            r#"{ "fps": { "num": 0, "den": 1 } }"#,
            r#"{ "frame_seconds": 0 }"#,
            r#"{ "comparison_frame_seconds": -0.35 }"#,
            r#"{ "fetch": { "concurrency": 0 } }"#,
            r#"{ "fetch": { "request_timeout_secs": 0 } }"#,
            r#"{ "fetch": { "request_timeout_secs": 1e-12 } }"#,
            r#"{ "fetch": { "request_timeout_secs": 1e20 } }"#,
        ];
        for json in bad {
            let err = AnimatorConfig::from_json_str(json).unwrap_err();
            assert!(matches!(err, AnimatorError::Validation(_)), "{json}: {err}");
        }
        assert!(AnimatorConfig::from_json_str("{ nope").is_err());
    }

    #[test]
    fn odd_canvas_is_fine_for_gif() {
        AnimatorConfig::from_json_str(
            r#"{ "format": "gif", "canvas": { "width": 641, "height": 361 }, "footer_height": 40 }"#,
        )
        .unwrap();
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("animator.json");
        std::fs::write(
            &path,
            r#"{ "legends": { "snow_cover": "snow.png", "ndvi": "/abs/ndvi.png" }, "fonts_dir": "fonts" }"#,
        )
        .unwrap();
        let cfg = AnimatorConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.legends[&LayerGroup::SnowCover], dir.path().join("snow.png"));
        assert_eq!(cfg.legends[&LayerGroup::Ndvi], PathBuf::from("/abs/ndvi.png"));
        assert_eq!(cfg.fonts_dir, Some(dir.path().join("fonts")));
    }
}
