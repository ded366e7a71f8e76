use std::time::Duration;

use crate::foundation::error::{AnimatorError, AnimatorResult};

/// Convert configured seconds into a track duration at millisecond resolution.
pub fn secs_to_duration(secs: f64) -> AnimatorResult<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(AnimatorError::validation(format!(
            "duration must be a positive number of seconds, got {secs}"
        )));
    }
    let millis = (secs * 1000.0).round();
    if millis < 1.0 {
        return Err(AnimatorError::validation(format!(
            "duration {secs}s is shorter than one millisecond"
        )));
    }
    Ok(Duration::from_millis(millis as u64))
}

/// One timed slot of a video timeline.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct TrackEntry {
    pub start: Duration,
    pub duration: Duration,
    pub label: String,
}

impl TrackEntry {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Ordered, gapless timeline. Entries can only be appended, and each starts exactly where the
/// previous one ended.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct TimedTrack {
    entries: Vec<TrackEntry>,
}

impl TimedTrack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot after the current end and return it.
    pub fn append(&mut self, duration: Duration, label: impl Into<String>) -> AnimatorResult<TrackEntry> {
        if duration.is_zero() {
            return Err(AnimatorError::assembly("track entries must have a non-zero duration"));
        }
        let entry = TrackEntry {
            start: self.end(),
            duration,
            label: label.into(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Total length of the timeline.
    pub fn end(&self) -> Duration {
        self.entries.last().map(TrackEntry::end).unwrap_or_default()
    }

    pub fn entries(&self) -> &[TrackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> AnimatorResult<()> {
        let mut cursor = TrackCursor::default();
        for e in &self.entries {
            cursor.advance(e)?;
        }
        Ok(())
    }
}

/// Tracks the expected start of the next entry; used by sinks to reject gaps and overlaps.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrackCursor {
    next: Duration,
}

impl TrackCursor {
    pub fn position(&self) -> Duration {
        self.next
    }

    pub fn advance(&mut self, entry: &TrackEntry) -> AnimatorResult<()> {
        if entry.duration.is_zero() {
            return Err(AnimatorError::assembly(format!(
                "entry '{}' has zero duration",
                entry.label
            )));
        }
        if entry.start != self.next {
            return Err(AnimatorError::assembly(format!(
                "entry '{}' starts at {:?}, expected {:?}",
                entry.label, entry.start, self.next
            )));
        }
        self.next = entry.end();
        Ok(())
    }
}
