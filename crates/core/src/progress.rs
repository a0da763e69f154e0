use std::time::{Duration, Instant};

use crate::{FileRef, JobState};

/// Run-time bookkeeping for a job.
///
/// Every method takes the current instant so callers decide which clock
/// reading a transition is stamped with.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProgressTracker {
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
    pause_started_at: Option<Instant>,
    paused: Duration,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Only the first end stamp counts.
    pub fn mark_ended(&mut self, now: Instant) {
        if self.started_at.is_some() && self.ended_at.is_none() {
            self.ended_at = Some(now);
        }
    }

    pub fn mark_paused(&mut self, now: Instant) {
        if self.pause_started_at.is_none() {
            self.pause_started_at = Some(now);
        }
    }

    pub fn mark_resumed(&mut self, now: Instant) {
        if let Some(pause_started_at) = self.pause_started_at.take() {
            self.paused += now.saturating_duration_since(pause_started_at);
        }
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    pub fn pause_started_at(&self) -> Option<Instant> {
        self.pause_started_at
    }

    /// Completed pauses plus the one in progress, if any.
    pub fn paused_time(&self, now: Instant) -> Duration {
        let ongoing = self
            .pause_started_at
            .map(|pause_started_at| now.saturating_duration_since(pause_started_at))
            .unwrap_or_default();
        self.paused + ongoing
    }

    pub fn effective_run_time(&self, now: Instant) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };
        let until = self.ended_at.unwrap_or(now);
        until
            .saturating_duration_since(started_at)
            .saturating_sub(self.paused_time(until))
    }
}

/// Point-in-time view of a job, safe to hand to another thread.
#[derive(Clone, Debug)]
pub struct JobProgress {
    pub state: JobState,
    pub current_index: usize,
    pub total: usize,
    pub current_file: Option<FileRef>,
    pub effective_run_time: Duration,
    pub paused_time: Duration,
}

impl JobProgress {
    /// Fraction of top-level files done, in `0.0..=1.0`.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return if self.state == JobState::Finished {
                1.0
            } else {
                0.0
            };
        }
        (self.current_index as f32 / self.total as f32).clamp(0.0, 1.0)
    }

    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }

    pub fn status_line(&self) -> String {
        match &self.current_file {
            Some(file) => format!("Processing '{}'", file.name()),
            None => String::from("Processing"),
        }
    }
}
