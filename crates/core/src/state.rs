use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::ProgressTracker;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum JobState {
    NotStarted,
    Running,
    /// Paused by a caller or while waiting on a decision.
    Paused,
    Interrupted,
    Finished,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Interrupted | Self::Finished)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Interrupted => "interrupted",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Transition {
    pub previous: JobState,
    pub next: JobState,
}

impl Transition {
    fn new(previous: JobState, next: JobState) -> Self {
        Self { previous, next }
    }
}

/// Result of the worker asking to take the `Running -> Finished` edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum FinishAttempt {
    Finished(Transition),
    Paused,
    Interrupted,
}

#[derive(Debug)]
struct MachineState {
    state: JobState,
    timing: ProgressTracker,
}

/// Canonical job state plus the pause primitive.
///
/// `transitions` serializes every state change and the queueing of its
/// notification; listeners are called after it is released. `inner` guards the state itself and is only
/// ever held for short reads and writes; the worker parks on `resumed` while
/// the job is paused.
#[derive(Debug)]
pub(crate) struct JobStateMachine {
    transitions: Mutex<()>,
    inner: Mutex<MachineState>,
    resumed: Condvar,
}

pub(crate) type TransitionGuard<'a> = MutexGuard<'a, ()>;

impl JobStateMachine {
    pub(crate) fn new() -> Self {
        Self {
            transitions: Mutex::new(()),
            inner: Mutex::new(MachineState {
                state: JobState::NotStarted,
                timing: ProgressTracker::new(),
            }),
            resumed: Condvar::new(),
        }
    }

    pub(crate) fn lock_transitions(&self) -> TransitionGuard<'_> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_inner(&self) -> MutexGuard<'_, MachineState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> JobState {
        self.lock_inner().state
    }

    pub(crate) fn timing(&self) -> ProgressTracker {
        self.lock_inner().timing
    }

    pub(crate) fn snapshot(&self) -> (JobState, ProgressTracker) {
        let inner = self.lock_inner();
        (inner.state, inner.timing)
    }

    pub(crate) fn mark_ended(&self, now: Instant) {
        self.lock_inner().timing.mark_ended(now);
    }

    pub(crate) fn begin(&self, _guard: &TransitionGuard<'_>, now: Instant) -> Option<Transition> {
        let mut inner = self.lock_inner();
        if inner.state != JobState::NotStarted {
            return None;
        }
        inner.state = JobState::Running;
        inner.timing.mark_started(now);
        Some(Transition::new(JobState::NotStarted, JobState::Running))
    }

    pub(crate) fn pause(&self, _guard: &TransitionGuard<'_>, now: Instant) -> Option<Transition> {
        let mut inner = self.lock_inner();
        if inner.state != JobState::Running {
            return None;
        }
        inner.state = JobState::Paused;
        inner.timing.mark_paused(now);
        Some(Transition::new(JobState::Running, JobState::Paused))
    }

    pub(crate) fn resume(&self, _guard: &TransitionGuard<'_>, now: Instant) -> Option<Transition> {
        let mut inner = self.lock_inner();
        if inner.state != JobState::Paused {
            return None;
        }
        inner.timing.mark_resumed(now);
        inner.state = JobState::Running;
        self.resumed.notify_all();
        Some(Transition::new(JobState::Paused, JobState::Running))
    }

    /// Moves a running or paused job to `Interrupted`.
    ///
    /// A paused job is resumed and interrupted in one step so the worker
    /// wakes straight into `Interrupted`; both edges are still reported.
    pub(crate) fn interrupt(&self, _guard: &TransitionGuard<'_>, now: Instant) -> Vec<Transition> {
        let mut inner = self.lock_inner();
        let mut transitions = Vec::with_capacity(2);
        match inner.state {
            JobState::NotStarted | JobState::Interrupted | JobState::Finished => {
                return transitions;
            }
            JobState::Paused => {
                inner.timing.mark_resumed(now);
                transitions.push(Transition::new(JobState::Paused, JobState::Running));
            }
            JobState::Running => {}
        }
        inner.state = JobState::Interrupted;
        self.resumed.notify_all();
        transitions.push(Transition::new(JobState::Running, JobState::Interrupted));
        transitions
    }

    pub(crate) fn finish(&self, _guard: &TransitionGuard<'_>) -> FinishAttempt {
        let mut inner = self.lock_inner();
        match inner.state {
            JobState::Running => {
                inner.state = JobState::Finished;
                FinishAttempt::Finished(Transition::new(JobState::Running, JobState::Finished))
            }
            JobState::Paused => FinishAttempt::Paused,
            JobState::NotStarted | JobState::Interrupted | JobState::Finished => {
                FinishAttempt::Interrupted
            }
        }
    }

    /// Blocks while the job is paused and returns the state that ended the wait.
    pub(crate) fn wait_while_paused(&self) -> JobState {
        let mut inner = self.lock_inner();
        while inner.state == JobState::Paused {
            inner = self
                .resumed
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner.state
    }
}
