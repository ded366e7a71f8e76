//! The "Create Animation" action: plan, fetch, then assemble both videos.

use std::{fmt, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::{
    assemble::Assembler,
    compose::{frames::Compositor, legend::LegendRegistry, text::TextPainter},
    config::{AnimatorConfig, DeliveryPolicy},
    encode::sink::SinkFactory,
    fetch::{BatchFetcher, FetchConfig, FetchReport, Frame, TileSource},
    foundation::{
        core::{GeoPoint, YearRange},
        error::{AnimatorError, AnimatorResult},
    },
    layers::LayerCatalog,
    loading::LoadingFlag,
    plan::plan_requests,
};

/// Message surfaced to the user for any failed run. The specific error is logged and returned.
pub const GENERIC_FAILURE: &str = "Could not create the animation. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Which of the two videos an output is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyKind {
    AllLayers,
    Comparison,
}

impl AssemblyKind {
    pub fn file_stem(self) -> &'static str {
        match self {
            AssemblyKind::AllLayers => "ada-all-layers",
            AssemblyKind::Comparison => "ada-snow-vs-ndvi",
        }
    }
}

impl fmt::Display for AssemblyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssemblyKind::AllLayers => "all-layers",
            AssemblyKind::Comparison => "comparison",
        })
    }
}

/// An encoded video ready to be saved or offered for download.
#[derive(Clone, PartialEq, Eq)]
pub struct VideoBlob {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for VideoBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoBlob")
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Result of one assembly, reported independently of the other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssemblyOutcome {
    Delivered(VideoBlob),
    Failed { error: String },
}

impl AssemblyOutcome {
    pub fn blob(&self) -> Option<&VideoBlob> {
        match self {
            AssemblyOutcome::Delivered(b) => Some(b),
            AssemblyOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnimationOutputs {
    pub all_layers: AssemblyOutcome,
    pub comparison: AssemblyOutcome,
}

impl AnimationOutputs {
    /// Delivered videos, all-layers first.
    pub fn blobs(&self) -> impl Iterator<Item = &VideoBlob> {
        [&self.all_layers, &self.comparison]
            .into_iter()
            .filter_map(AssemblyOutcome::blob)
    }
}

/// Owns the pick, the run state and the last run's outputs.
pub struct Animator {
    source: Arc<dyn TileSource>,
    sinks: Arc<dyn SinkFactory>,
    assembler: Assembler,
    catalog: LayerCatalog,
    endpoint: String,
    fetch: FetchConfig,
    delivery: DeliveryPolicy,

    pick: Option<GeoPoint>,
    state: AnimationState,
    outputs: Option<AnimationOutputs>,
    last_error: Option<String>,
    loading: LoadingFlag,
    cancel: CancellationToken,
}

impl Animator {
    /// Build an animator from a validated config. Output container follows `config.format`.
    pub fn new(
        config: &AnimatorConfig,
        source: Arc<dyn TileSource>,
        legends: LegendRegistry,
    ) -> AnimatorResult<Self> {
        config.validate()?;
        let text = TextPainter::new(config.fonts_dir.as_deref());
        let compositor = Compositor::new(
            config.canvas,
            config.footer_height,
            config.catalog.clone(),
            legends,
            text,
        )?;
        let assembler = Assembler::new(
            Arc::new(compositor),
            config.labels(),
            config.timings()?,
            config.fps,
        );
        Ok(Self {
            source,
            sinks: Arc::new(config.format),
            assembler,
            catalog: config.catalog.clone(),
            endpoint: config.wms_endpoint.clone(),
            fetch: config.fetch.clone(),
            delivery: config.delivery,
            pick: None,
            state: AnimationState::Idle,
            outputs: None,
            last_error: None,
            loading: LoadingFlag::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_sink_factory(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = sinks;
        self
    }

    /// Record the most recent map pick. Plausibility is not checked.
    pub fn set_pick(&mut self, pick: GeoPoint) {
        self.pick = Some(pick);
    }

    pub fn pick(&self) -> Option<GeoPoint> {
        self.pick
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn outputs(&self) -> Option<&AnimationOutputs> {
        self.outputs.as_ref()
    }

    /// User-facing message for the last failed action, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn loading(&self) -> &LoadingFlag {
        &self.loading
    }

    /// Token that aborts the run in progress, or the next one if none is running. A fresh token
    /// replaces it once a cancelled run has finished.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drop any finished results and go back to `Idle`.
    pub fn reset(&mut self) {
        if self.state != AnimationState::Running {
            self.state = AnimationState::Idle;
            self.outputs = None;
            self.last_error = None;
        }
    }

    /// Run the whole pipeline for the current pick.
    ///
    /// Without a pick this fails with a validation error before any request is made and the
    /// state is left untouched. Otherwise previous results are discarded, the state moves to
    /// `Running` and ends in `Succeeded` or `Failed`.
    #[instrument(skip_all, fields(range = %range))]
    pub async fn create_animation(&mut self, range: YearRange) -> AnimatorResult<&AnimationOutputs> {
        let Some(pick) = self.pick else {
            self.last_error = Some("Pick a location on the map first.".to_string());
            return Err(AnimatorError::validation("no location has been picked"));
        };
        if !range.is_preset() {
            warn!(%range, "year range is not one of the preset windows");
        }

        self.state = AnimationState::Running;
        self.outputs = None;
        self.last_error = None;

        let result = {
            let _loading = self.loading.raise();
            self.run(pick, range).await
        };
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        match result {
            Ok(outputs) => {
                self.state = AnimationState::Succeeded;
                let outputs = self.outputs.insert(outputs);
                Ok(&*outputs)
            }
            Err(err) => {
                error!(error = %err, "animation failed");
                self.state = AnimationState::Failed;
                self.last_error = Some(GENERIC_FAILURE.to_string());
                Err(err)
            }
        }
    }

    async fn run(&self, pick: GeoPoint, range: YearRange) -> AnimatorResult<AnimationOutputs> {
        let requests = plan_requests(&self.endpoint, &self.catalog, range, pick)?;
        info!(
            requests = requests.len(),
            lat = pick.latitude,
            lon = pick.longitude,
            "planned tile requests"
        );

        let report = BatchFetcher::new(Arc::clone(&self.source), self.fetch.clone())
            .with_loading(self.loading.clone())
            .with_cancel(self.cancel.clone())
            .fetch_all(requests)
            .await?;
        let frames: Arc<[Frame]> = self.usable_frames(report)?.into();

        let all_layers = self.assemble(AssemblyKind::AllLayers, Arc::clone(&frames)).await;
        if let Err(AnimatorError::Cancelled) = all_layers {
            return Err(AnimatorError::Cancelled);
        }
        let comparison = self.assemble(AssemblyKind::Comparison, frames).await;
        if let Err(AnimatorError::Cancelled) = comparison {
            return Err(AnimatorError::Cancelled);
        }

        self.deliver(all_layers, comparison)
    }

    /// Frames from a report. A report with failures is usable only if every group still has at
    /// least one frame.
    fn usable_frames(&self, report: FetchReport) -> AnimatorResult<Vec<Frame>> {
        if report.is_complete() {
            return Ok(report.frames);
        }
        let missing = self
            .catalog
            .specs
            .iter()
            .map(|s| s.group)
            .find(|g| !report.frames.iter().any(|f| f.group == *g));

        match missing {
            None => {
                warn!(
                    failures = report.failures.len(),
                    frames = report.frames.len(),
                    "continuing with partial tile set"
                );
                Ok(report.frames)
            }
            Some(group) => {
                let mut failures = report.failures.into_iter();
                let first = failures
                    .find(|f| f.request.group == group)
                    .map(|f| f.error)
                    .unwrap_or_else(|| {
                        AnimatorError::validation(format!("no frames fetched for group '{group}'"))
                    });
                Err(first)
            }
        }
    }

    async fn assemble(&self, kind: AssemblyKind, frames: Arc<[Frame]>) -> AnimatorResult<VideoBlob> {
        let assembler = self.assembler.clone().with_cancel(self.cancel.clone());
        let sinks = Arc::clone(&self.sinks);

        let assembly = tokio::task::spawn_blocking(move || {
            let mut sink = sinks.create_sink()?;
            match kind {
                AssemblyKind::AllLayers => assembler.assemble_all_layers(&frames, sink.as_mut()),
                AssemblyKind::Comparison => assembler.assemble_comparison(&frames, sink.as_mut()),
            }
        })
        .await
        .map_err(|e| AnimatorError::assembly(format!("{kind} assembly task failed: {e}")))?;

        match assembly {
            Ok(a) => Ok(VideoBlob {
                filename: format!("{}.{}", kind.file_stem(), self.sinks.extension()),
                mime: self.sinks.mime().to_string(),
                bytes: a.bytes,
            }),
            Err(err) => {
                warn!(%kind, error = %err, "assembly failed");
                Err(err)
            }
        }
    }

    fn deliver(
        &self,
        all_layers: AnimatorResult<VideoBlob>,
        comparison: AnimatorResult<VideoBlob>,
    ) -> AnimatorResult<AnimationOutputs> {
        match (self.delivery, all_layers, comparison) {
            (_, Ok(a), Ok(c)) => Ok(AnimationOutputs {
                all_layers: AssemblyOutcome::Delivered(a),
                comparison: AssemblyOutcome::Delivered(c),
            }),
            (DeliveryPolicy::AllOrNothing, Err(e), _) | (DeliveryPolicy::AllOrNothing, _, Err(e)) => {
                Err(e)
            }
            (DeliveryPolicy::Partial, Err(e), Err(_)) => Err(e),
            (DeliveryPolicy::Partial, a, c) => Ok(AnimationOutputs {
                all_layers: outcome(a),
                comparison: outcome(c),
            }),
        }
    }
}

fn outcome(res: AnimatorResult<VideoBlob>) -> AssemblyOutcome {
    match res {
        Ok(blob) => AssemblyOutcome::Delivered(blob),
        Err(e) => AssemblyOutcome::Failed {
            error: e.to_string(),
        },
    }
}
