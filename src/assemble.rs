//! Turns fetched frames into the two output videos.
//!
//! Both procedures paint onto a single surface, append each painted state to a [`TimedTrack`]
//! and push it to a [`VideoSink`] immediately, so at most one decoded tile is alive at a time.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::{
    compose::{
        frames::{Compositor, pair_by_date},
        surface::Surface,
    },
    config::{Labels, Timings},
    encode::{
        sink::{SinkConfig, VideoSink},
        track::TimedTrack,
    },
    fetch::Frame,
    foundation::{
        core::Fps,
        error::{AnimatorError, AnimatorResult},
    },
    layers::LayerGroup,
};

/// Groups shown side by side in the comparison video, left then right.
pub const COMPARISON_GROUPS: (LayerGroup, LayerGroup) = (LayerGroup::SnowCover, LayerGroup::Ndvi);

/// One finished video and the timeline it was encoded from.
#[derive(Debug)]
pub struct Assembly {
    pub bytes: Vec<u8>,
    pub track: TimedTrack,
}

#[derive(Clone)]
pub struct Assembler {
    compositor: Arc<Compositor>,
    labels: Labels,
    timings: Timings,
    fps: Fps,
    cancel: CancellationToken,
}

impl Assembler {
    pub fn new(compositor: Arc<Compositor>, labels: Labels, timings: Timings, fps: Fps) -> Self {
        Self {
            compositor,
            labels,
            timings,
            fps,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Intro card, then for each group in encounter order its title card followed by its frames
    /// in ascending date order.
    #[instrument(skip_all, fields(frames = frames.len()))]
    pub fn assemble_all_layers(
        &self,
        frames: &[Frame],
        sink: &mut dyn VideoSink,
    ) -> AnimatorResult<Assembly> {
        let mut run = self.start(sink)?;
        let comp = &self.compositor;

        comp.draw_intro(
            &mut run.surface,
            &self.labels.intro_title,
            &self.labels.intro_subtitle,
        )?;
        run.emit(self.timings.intro, "intro")?;

        for group in groups_in_encounter_order(frames) {
            self.check_cancelled()?;
            comp.draw_group_title(&mut run.surface, &self.labels.layer_heading, group)?;
            run.emit(self.timings.title, format!("title:{group}"))?;

            let mut group_frames: Vec<&Frame> =
                frames.iter().filter(|f| f.group == group).collect();
            group_frames.sort_by_key(|f| f.date);
            debug!(%group, frames = group_frames.len(), "assembling group");

            for frame in group_frames {
                self.check_cancelled()?;
                comp.draw_content_frame(&mut run.surface, frame)?;
                run.emit(self.timings.frame, format!("{group}:{}", frame.date_string()))?;
            }
        }

        let out = run.finish()?;
        info!(
            entries = out.track.len(),
            seconds = out.track.end().as_secs_f64(),
            bytes = out.bytes.len(),
            "all-layers video assembled"
        );
        Ok(out)
    }

    /// Comparison title card, then one two-panel frame per date both groups have.
    #[instrument(skip_all, fields(frames = frames.len()))]
    pub fn assemble_comparison(
        &self,
        frames: &[Frame],
        sink: &mut dyn VideoSink,
    ) -> AnimatorResult<Assembly> {
        let (left, right) = COMPARISON_GROUPS;
        let pairs = pair_by_date(frames, left, right);
        if pairs.is_empty() {
            warn!(%left, %right, "no dates shared by both groups; comparison holds only its title");
        }

        let mut run = self.start(sink)?;
        let comp = &self.compositor;

        comp.draw_heading_card(&mut run.surface, &self.labels.comparison_title)?;
        run.emit(self.timings.comparison_title, "title:comparison")?;

        for (l, r) in pairs {
            self.check_cancelled()?;
            comp.draw_comparison_frame(&mut run.surface, l, r)?;
            run.emit(self.timings.comparison_frame, format!("pair:{}", l.date_string()))?;
        }

        let out = run.finish()?;
        info!(
            entries = out.track.len(),
            seconds = out.track.end().as_secs_f64(),
            bytes = out.bytes.len(),
            "comparison video assembled"
        );
        Ok(out)
    }

    fn start<'s>(&self, sink: &'s mut dyn VideoSink) -> AnimatorResult<Run<'s>> {
        self.check_cancelled()?;
        let canvas = self.compositor.canvas();
        sink.begin(SinkConfig::new(canvas.width, canvas.height, self.fps))?;
        Ok(Run {
            surface: self.compositor.surface()?,
            track: TimedTrack::new(),
            sink,
        })
    }

    fn check_cancelled(&self) -> AnimatorResult<()> {
        if self.cancel.is_cancelled() {
            return Err(AnimatorError::Cancelled);
        }
        Ok(())
    }
}

/// State of one assembly in progress.
struct Run<'s> {
    surface: Surface,
    track: TimedTrack,
    sink: &'s mut dyn VideoSink,
}

impl Run<'_> {
    /// Capture the surface as the next track entry.
    fn emit(&mut self, duration: Duration, label: impl Into<String>) -> AnimatorResult<()> {
        let entry = self.track.append(duration, label)?;
        self.sink.push_frame(&entry, &self.surface.snapshot())
    }

    fn finish(self) -> AnimatorResult<Assembly> {
        self.track.validate()?;
        let bytes = self.sink.end()?;
        Ok(Assembly {
            bytes,
            track: self.track,
        })
    }
}

fn groups_in_encounter_order(frames: &[Frame]) -> Vec<LayerGroup> {
    let mut groups = Vec::new();
    for f in frames {
        if !groups.contains(&f.group) {
            groups.push(f.group);
        }
    }
    groups
}
