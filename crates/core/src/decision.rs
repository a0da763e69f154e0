use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::{AlertKind, FileJob, JobId};

pub const DEFAULT_DECISION_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DecisionOutcome {
    Skip,
    SkipAll,
    Retry,
    Cancel,
    /// Resume a partial transfer by appending to the destination.
    Append,
    Ok,
    Overwrite,
    OverwriteAll,
    OverwriteReadonly,
    OverwriteReadonlyAll,
    RetryAsRoot,
    RetryAsRootAlways,
}

impl DecisionOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Skip => "Skip",
            Self::SkipAll => "Skip all",
            Self::Retry => "Retry",
            Self::Cancel => "Cancel",
            Self::Append => "Resume",
            Self::Ok => "OK",
            Self::Overwrite => "Overwrite",
            Self::OverwriteAll => "Overwrite all",
            Self::OverwriteReadonly => "Overwrite read-only",
            Self::OverwriteReadonlyAll => "Overwrite all read-only",
            Self::RetryAsRoot => "Retry as root",
            Self::RetryAsRootAlways => "Always retry as root",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "skip" => Some(Self::Skip),
            "skip_all" => Some(Self::SkipAll),
            "retry" => Some(Self::Retry),
            "cancel" => Some(Self::Cancel),
            "append" | "resume" => Some(Self::Append),
            "ok" => Some(Self::Ok),
            "overwrite" => Some(Self::Overwrite),
            "overwrite_all" => Some(Self::OverwriteAll),
            "overwrite_readonly" => Some(Self::OverwriteReadonly),
            "overwrite_readonly_all" => Some(Self::OverwriteReadonlyAll),
            "retry_as_root" => Some(Self::RetryAsRoot),
            "retry_as_root_always" => Some(Self::RetryAsRootAlways),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

pub const ERROR_OUTCOMES: &[DecisionOutcome] = &[
    DecisionOutcome::Skip,
    DecisionOutcome::SkipAll,
    DecisionOutcome::Retry,
    DecisionOutcome::Cancel,
];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecisionRequest {
    pub job_id: JobId,
    pub title: String,
    pub message: String,
    pub outcomes: Vec<DecisionOutcome>,
}

impl DecisionRequest {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        outcomes: impl Into<Vec<DecisionOutcome>>,
    ) -> Self {
        Self {
            job_id: JobId(0),
            title: title.into(),
            message: message.into(),
            outcomes: outcomes.into(),
        }
    }

    /// Skip, skip all, retry or cancel.
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(title, message, ERROR_OUTCOMES)
    }

    pub fn offers(&self, outcome: DecisionOutcome) -> bool {
        self.outcomes.contains(&outcome)
    }
}

/// Source of answers for per-file failures, usually a human.
///
/// `ask` blocks until an answer arrives. `None` means the prompt was
/// dismissed. Implementations must return promptly once `cancel_flag` is
/// raised.
pub trait DecisionMaker: Send + Sync {
    fn ask(&self, request: &DecisionRequest, cancel_flag: &AtomicBool) -> Option<DecisionOutcome>;
}

/// A question waiting on the interactive side of a [`ChannelDecisionMaker`].
///
/// Dropping the prompt without answering dismisses it.
#[derive(Debug)]
pub struct DecisionPrompt {
    pub request: DecisionRequest,
    reply: Sender<DecisionOutcome>,
}

impl DecisionPrompt {
    /// Returns false when the job stopped waiting.
    pub fn answer(self, outcome: DecisionOutcome) -> bool {
        self.reply.send(outcome).is_ok()
    }

    pub fn dismiss(self) {}
}

/// Forwards decision requests over a channel to the interactive thread.
#[derive(Debug)]
pub struct ChannelDecisionMaker {
    prompt_tx: Sender<DecisionPrompt>,
    poll_interval: Duration,
}

impl ChannelDecisionMaker {
    pub fn new(prompt_tx: Sender<DecisionPrompt>) -> Self {
        Self::with_poll_interval(prompt_tx, DEFAULT_DECISION_POLL_INTERVAL)
    }

    pub fn with_poll_interval(prompt_tx: Sender<DecisionPrompt>, poll_interval: Duration) -> Self {
        Self {
            prompt_tx,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }
}

impl DecisionMaker for ChannelDecisionMaker {
    fn ask(&self, request: &DecisionRequest, cancel_flag: &AtomicBool) -> Option<DecisionOutcome> {
        if cancel_flag.load(Ordering::Acquire) {
            return None;
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        let prompt = DecisionPrompt {
            request: request.clone(),
            reply: reply_tx,
        };
        if self.prompt_tx.send(prompt).is_err() {
            return None;
        }

        loop {
            if cancel_flag.load(Ordering::Acquire) {
                return None;
            }
            match reply_rx.recv_timeout(self.poll_interval) {
                Ok(outcome) => return Some(outcome),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// Answers without a human: the first preferred outcome on offer wins, and
/// requests offering none of them are dismissed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AutoAnswer {
    preferred: Vec<DecisionOutcome>,
}

impl AutoAnswer {
    pub fn new(preferred: impl Into<Vec<DecisionOutcome>>) -> Self {
        Self {
            preferred: preferred.into(),
        }
    }

    pub fn skip() -> Self {
        Self::new([DecisionOutcome::Skip])
    }
}

impl Default for AutoAnswer {
    fn default() -> Self {
        Self::skip()
    }
}

impl DecisionMaker for AutoAnswer {
    fn ask(&self, request: &DecisionRequest, _cancel_flag: &AtomicBool) -> Option<DecisionOutcome> {
        self.preferred
            .iter()
            .copied()
            .find(|outcome| request.offers(*outcome))
    }
}

impl FileJob {
    /// Resolves a per-file failure, blocking the worker until an answer exists.
    ///
    /// With sticky skip enabled, requests that offer `Skip` are answered
    /// without prompting. Otherwise the job is paused for the duration of
    /// the prompt. A dismissed prompt or a `Cancel` answer cancels the job and
    /// yields `Cancel`; `SkipAll` turns sticky skip on and yields `Skip`.
    pub fn resolve(&self, mut request: DecisionRequest) -> DecisionOutcome {
        request.job_id = self.id();
        if self.auto_skip_errors() && request.offers(DecisionOutcome::Skip) {
            tracing::debug!(
                job_event = "auto_skipped",
                job_id = %self.id(),
                title = %request.title,
                "skipped without prompting"
            );
            return DecisionOutcome::Skip;
        }

        if self.shared.notify_on_error {
            self.shared
                .alerts
                .notify(AlertKind::JobError, &request.title, &request.message);
        }

        tracing::debug!(
            job_event = "decision_requested",
            job_id = %self.id(),
            title = %request.title,
            offered = request.outcomes.len(),
            "waiting for decision"
        );
        self.set_paused(true);
        let answer = self
            .shared
            .decisions
            .ask(&request, &self.shared.cancel_flag)
            .filter(|outcome| request.offers(*outcome));
        self.set_paused(false);

        let outcome = match answer {
            None | Some(DecisionOutcome::Cancel) => {
                self.cancel();
                DecisionOutcome::Cancel
            }
            Some(DecisionOutcome::SkipAll) => {
                self.set_auto_skip_errors(true);
                DecisionOutcome::Skip
            }
            Some(outcome) => outcome,
        };
        tracing::debug!(
            job_event = "decision_resolved",
            job_id = %self.id(),
            answered = answer.is_some(),
            outcome = outcome.label(),
            "decision resolved"
        );
        outcome
    }
}
