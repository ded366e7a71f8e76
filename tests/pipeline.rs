use std::{
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;

use gibs_animator::{
    AnimationState, Animator, AnimatorConfig, AnimatorError, AnimatorResult, AssemblyOutcome,
    Canvas, DeliveryPolicy, FetchPolicy, GeoPoint, InMemorySinkFactory, LayerGroup,
    LegendRegistry, OutputFormat, TileSource, YearRange, orchestrator::GENERIC_FAILURE,
};

const BOGOTA: (f64, f64) = (4.711, -74.0721);

/// Serves a small PNG per request; URLs containing a configured substring get an HTTP error.
struct StubSource {
    tile: Bytes,
    fail_on: Option<(String, u16)>,
    calls: AtomicUsize,
}

impl StubSource {
    fn ok() -> Self {
        Self {
            tile: Bytes::from(png(16, 12, [40, 120, 60, 255])),
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing(substring: &str, status: u16) -> Self {
        Self {
            fail_on: Some((substring.to_string(), status)),
            ..Self::ok()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileSource for StubSource {
    async fn get(&self, url: &str) -> AnimatorResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if let Some((needle, status)) = &self.fail_on
            && url.contains(needle.as_str())
        {
            return Err(AnimatorError::http_status(url, *status));
        }
        Ok(self.tile.clone())
    }
}

fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn small_config(format: OutputFormat) -> AnimatorConfig {
    let mut cfg = AnimatorConfig {
        canvas: Canvas {
            width: 64,
            height: 36,
        },
        footer_height: 6,
        format,
        ..AnimatorConfig::default()
    };
    cfg.fetch.max_retries = 0;
    cfg
}

fn animator(source: Arc<StubSource>, cfg: &AnimatorConfig) -> Animator {
    Animator::new(cfg, source, LegendRegistry::new())
        .unwrap()
        .with_sink_factory(Arc::new(InMemorySinkFactory))
}

fn bogota() -> GeoPoint {
    GeoPoint::new(BOGOTA.0, BOGOTA.1)
}

fn entry_labels(bytes: &[u8]) -> Vec<String> {
    let v: serde_json::Value = serde_json::from_slice(bytes).unwrap();
    v.as_array()
        .unwrap()
        .iter()
        .map(|e| e["label"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn bogota_2001_2003_produces_both_videos() {
    let source = Arc::new(StubSource::ok());
    let cfg = small_config(OutputFormat::Gif);
    let mut animator = animator(Arc::clone(&source), &cfg);
    let mut loading = animator.loading().subscribe();

    animator.set_pick(bogota());
    assert_eq!(animator.state(), AnimationState::Idle);

    let outputs = animator
        .create_animation(YearRange::new(2001, 2003).unwrap())
        .await
        .unwrap()
        .clone();

    assert_eq!(animator.state(), AnimationState::Succeeded);
    assert_eq!(source.calls(), 3 * 36);
    assert!(!animator.loading().is_loading());
    assert!(loading.has_changed().unwrap());
    assert!(!*loading.borrow_and_update());
    assert!(animator.last_error().is_none());

    let blobs: Vec<_> = outputs.blobs().collect();
    assert_eq!(blobs.len(), 2);
    assert_eq!(blobs[0].filename, "ada-all-layers.json");
    assert_eq!(blobs[1].filename, "ada-snow-vs-ndvi.json");
    assert!(blobs.iter().all(|b| !b.bytes.is_empty()));

    // intro + 3 x (title + 36 months)
    let all = entry_labels(&blobs[0].bytes);
    assert_eq!(all.len(), 1 + 3 * 37);
    assert_eq!(all[0], "intro");
    assert_eq!(all[1], "title:carbon_monoxide");
    assert_eq!(all[2], "carbon_monoxide:2001-01-01");
    assert_eq!(all[37], "carbon_monoxide:2003-12-01");
    assert_eq!(all[38], "title:ndvi");

    // title + one pair per month
    let cmp = entry_labels(&blobs[1].bytes);
    assert_eq!(cmp.len(), 1 + 36);
    assert_eq!(cmp[1], "pair:2001-01-01");
    assert_eq!(cmp[36], "pair:2003-12-01");
}

#[tokio::test]
async fn gif_output_is_a_real_gif() {
    let source = Arc::new(StubSource::ok());
    let cfg = small_config(OutputFormat::Gif);
    let mut animator = Animator::new(&cfg, source, LegendRegistry::new()).unwrap();
    animator.set_pick(bogota());

    let outputs = animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap();
    for blob in outputs.blobs() {
        assert!(blob.filename.ends_with(".gif"));
        assert_eq!(blob.mime, "image/gif");
        assert_eq!(&blob.bytes[..6], b"GIF89a");
    }
}

#[tokio::test]
async fn create_without_pick_is_rejected_before_any_request() {
    let source = Arc::new(StubSource::ok());
    let mut animator = animator(Arc::clone(&source), &small_config(OutputFormat::Gif));

    let err = animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap_err();

    assert!(matches!(err, AnimatorError::Validation(_)));
    assert_eq!(animator.state(), AnimationState::Idle);
    assert_eq!(source.calls(), 0);
    assert!(animator.outputs().is_none());
    assert!(!animator.loading().is_loading());
}

#[tokio::test]
async fn server_error_fails_the_whole_run() {
    let source = Arc::new(StubSource::failing("TIME=2002-06-01", 500));
    let mut animator = animator(Arc::clone(&source), &small_config(OutputFormat::Gif));
    animator.set_pick(bogota());

    let err = animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert_eq!(animator.state(), AnimationState::Failed);
    assert_eq!(animator.last_error(), Some(GENERIC_FAILURE));
    assert!(animator.outputs().is_none());
    assert!(!animator.loading().is_loading());
}

#[tokio::test]
async fn retrigger_after_failure_discards_previous_state() {
    let cfg = small_config(OutputFormat::Gif);
    let mut failing = animator(
        Arc::new(StubSource::failing("TIME=2001-01-01", 404)),
        &cfg,
    );
    failing.set_pick(bogota());
    assert!(failing.create_animation(YearRange::WINDOWS[0]).await.is_err());
    assert_eq!(failing.state(), AnimationState::Failed);

    failing.reset();
    assert_eq!(failing.state(), AnimationState::Idle);
    assert!(failing.last_error().is_none());

    let mut ok = animator(Arc::new(StubSource::ok()), &cfg);
    ok.set_pick(bogota());
    ok.create_animation(YearRange::WINDOWS[0]).await.unwrap();
    ok.create_animation(YearRange::WINDOWS[1]).await.unwrap();
    assert_eq!(ok.state(), AnimationState::Succeeded);
    let labels = entry_labels(&ok.outputs().unwrap().blobs().next().unwrap().bytes);
    assert_eq!(labels[2], "carbon_monoxide:2004-01-01");
}

#[tokio::test]
async fn collect_errors_tolerates_missing_months() {
    let mut cfg = small_config(OutputFormat::Gif);
    cfg.fetch.policy = FetchPolicy::CollectErrors;
    let source = Arc::new(StubSource::failing("TIME=2002-06-01", 500));
    let mut animator = animator(Arc::clone(&source), &cfg);
    animator.set_pick(bogota());

    let outputs = animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap();

    let all = entry_labels(&outputs.all_layers.blob().unwrap().bytes);
    assert_eq!(all.len(), 1 + 3 * 36);
    assert!(!all.iter().any(|l| l.ends_with("2002-06-01")));
    let cmp = entry_labels(&outputs.comparison.blob().unwrap().bytes);
    assert_eq!(cmp.len(), 1 + 35);
}

#[tokio::test]
async fn collect_errors_still_fails_when_a_group_is_empty() {
    let mut cfg = small_config(OutputFormat::Gif);
    cfg.fetch.policy = FetchPolicy::CollectErrors;
    let snow_layer = cfg
        .catalog
        .specs
        .iter()
        .find(|s| s.group == LayerGroup::SnowCover)
        .unwrap()
        .layer_id
        .clone();
    let source = Arc::new(StubSource::failing(&snow_layer, 503));
    let mut animator = animator(source, &cfg);
    animator.set_pick(bogota());

    let err = animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(animator.state(), AnimationState::Failed);
}

#[tokio::test]
async fn cancelled_run_fails_and_token_is_renewed() {
    let source = Arc::new(StubSource::ok());
    let mut animator = animator(Arc::clone(&source), &small_config(OutputFormat::Gif));
    animator.set_pick(bogota());

    animator.cancel_token().cancel();
    let err = animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap_err();
    assert!(matches!(err, AnimatorError::Cancelled));
    assert_eq!(animator.state(), AnimationState::Failed);
    assert!(!animator.loading().is_loading());

    assert!(!animator.cancel_token().is_cancelled());
    animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap();
}

#[tokio::test]
async fn partial_delivery_reports_each_assembly() {
    // The second sink handed out cannot finalize, so only the comparison assembly fails.
    let mut cfg = small_config(OutputFormat::Gif);
    cfg.delivery = DeliveryPolicy::Partial;
    let mut animator = Animator::new(&cfg, Arc::new(StubSource::ok()), LegendRegistry::new())
        .unwrap()
        .with_sink_factory(Arc::new(FailSecond::default()));
    animator.set_pick(bogota());

    let outputs = animator
        .create_animation(YearRange::WINDOWS[0])
        .await
        .unwrap();
    assert!(outputs.all_layers.blob().is_some());
    assert!(matches!(outputs.comparison, AssemblyOutcome::Failed { .. }));
    assert_eq!(animator.state(), AnimationState::Succeeded);

    cfg.delivery = DeliveryPolicy::AllOrNothing;
    let mut strict = Animator::new(&cfg, Arc::new(StubSource::ok()), LegendRegistry::new())
        .unwrap()
        .with_sink_factory(Arc::new(FailSecond::default()));
    strict.set_pick(bogota());
    assert!(strict.create_animation(YearRange::WINDOWS[0]).await.is_err());
    assert_eq!(strict.state(), AnimationState::Failed);
    assert!(strict.outputs().is_none());
}

/// Hands out a working in-memory sink first and a sink that fails on `end` afterwards.
#[derive(Default)]
struct FailSecond {
    made: AtomicUsize,
}

impl gibs_animator::SinkFactory for FailSecond {
    fn create_sink(&self) -> AnimatorResult<Box<dyn gibs_animator::VideoSink>> {
        if self.made.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Box::new(gibs_animator::InMemorySink::new()))
        } else {
            Ok(Box::new(BrokenSink))
        }
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn mime(&self) -> &'static str {
        "application/json"
    }
}

struct BrokenSink;

impl gibs_animator::VideoSink for BrokenSink {
    fn begin(&mut self, _cfg: gibs_animator::SinkConfig) -> AnimatorResult<()> {
        Ok(())
    }

    fn push_frame(
        &mut self,
        _entry: &gibs_animator::TrackEntry,
        _frame: &gibs_animator::FrameRGBA,
    ) -> AnimatorResult<()> {
        Ok(())
    }

    fn end(&mut self) -> AnimatorResult<Vec<u8>> {
        Err(AnimatorError::assembly("container finalize failed"))
    }
}
