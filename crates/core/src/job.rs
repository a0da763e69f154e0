use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use crate::runner::run_job;
use crate::state::{JobStateMachine, Transition};
use crate::{
    AlertSink, AutoAnswer, DecisionMaker, DetachedView, FileRef, FileSet, JobError, JobListener,
    JobOperation, JobProgress, JobSettings, JobState, ListenerRegistry, PanelView, ProgressTracker,
    TracingAlerts,
};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JobId(pub u64);

impl JobId {
    fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Collaborators and policies a job is created with.
#[derive(Clone)]
pub struct JobConfig {
    pub title: String,
    pub decisions: Arc<dyn DecisionMaker>,
    pub alerts: Arc<dyn AlertSink>,
    pub view: Arc<dyn PanelView>,
    pub auto_unmark: bool,
    pub auto_skip_errors: bool,
    pub notify_on_completion: bool,
    pub notify_on_error: bool,
    pub pause_folder_monitoring: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::from_settings(&JobSettings::default())
    }
}

impl JobConfig {
    pub fn from_settings(settings: &JobSettings) -> Self {
        Self {
            title: String::from("File job"),
            decisions: Arc::new(AutoAnswer::skip()),
            alerts: Arc::new(TracingAlerts),
            view: Arc::new(DetachedView),
            auto_unmark: settings.auto_unmark,
            auto_skip_errors: settings.auto_skip_errors,
            notify_on_completion: settings.notify_on_completion,
            notify_on_error: settings.notify_on_error,
            pause_folder_monitoring: settings.pause_folder_monitoring,
        }
    }
}

#[derive(Debug, Default)]
struct Cursor {
    index: Option<usize>,
    file: Option<FileRef>,
}

pub(crate) struct JobShared {
    pub(crate) id: JobId,
    pub(crate) title: String,
    pub(crate) operation: Arc<dyn JobOperation>,
    pub(crate) decisions: Arc<dyn DecisionMaker>,
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) view: Arc<dyn PanelView>,
    pub(crate) notify_on_completion: bool,
    pub(crate) notify_on_error: bool,
    pub(crate) pause_folder_monitoring: bool,
    pub(crate) machine: JobStateMachine,
    pub(crate) cancel_flag: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) file_to_select: Mutex<Option<FileRef>>,
    listeners: ListenerRegistry,
    files: Mutex<FileSet>,
    total: AtomicUsize,
    cursor: Mutex<Cursor>,
    auto_unmark: AtomicBool,
    auto_skip_errors: AtomicBool,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Handle to one batch file job. Clones share the same job.
#[derive(Clone)]
pub struct FileJob {
    pub(crate) shared: Arc<JobShared>,
}

impl fmt::Debug for FileJob {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("FileJob")
            .field("id", &self.shared.id)
            .field("title", &self.shared.title)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FileJob {
    pub fn new(files: FileSet, operation: Arc<dyn JobOperation>, config: JobConfig) -> Self {
        let files = files.cached();
        let total = files.len();
        Self {
            shared: Arc::new(JobShared {
                id: JobId::next(),
                title: config.title,
                operation,
                decisions: config.decisions,
                alerts: config.alerts,
                view: config.view,
                notify_on_completion: config.notify_on_completion,
                notify_on_error: config.notify_on_error,
                pause_folder_monitoring: config.pause_folder_monitoring,
                machine: JobStateMachine::new(),
                cancel_flag: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                file_to_select: Mutex::new(None),
                listeners: ListenerRegistry::new(),
                files: Mutex::new(files),
                total: AtomicUsize::new(total),
                cursor: Mutex::new(Cursor::default()),
                auto_unmark: AtomicBool::new(config.auto_unmark),
                auto_skip_errors: AtomicBool::new(config.auto_skip_errors),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    pub fn title(&self) -> &str {
        &self.shared.title
    }

    pub fn state(&self) -> JobState {
        self.shared.machine.state()
    }

    pub fn is_interrupted(&self) -> bool {
        self.state() == JobState::Interrupted
    }

    /// Spawns the worker. Returns `Ok(false)` when the job was already started.
    pub fn start(&self) -> Result<bool, JobError> {
        let machine = &self.shared.machine;
        {
            let guard = machine.lock_transitions();
            let Some(transition) = machine.begin(&guard, Instant::now()) else {
                return Ok(false);
            };
            self.publish(transition);
        }
        if self.shared.pause_folder_monitoring {
            self.shared.view.set_monitoring_paused(true);
        }
        self.deliver_transitions();

        let job = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("fj-job-{}", self.id()))
            .spawn(move || run_job(job));
        match spawned {
            Ok(handle) => {
                *lock(&self.shared.worker) = Some(handle);
                Ok(true)
            }
            Err(source) => {
                tracing::warn!(
                    job_event = "spawn_failed",
                    job_id = %self.id(),
                    error = %source,
                    "failed to spawn job worker"
                );
                let now = Instant::now();
                {
                    let guard = machine.lock_transitions();
                    for transition in machine.interrupt(&guard, now) {
                        self.publish(transition);
                    }
                }
                machine.mark_ended(now);
                self.deliver_transitions();
                if self.shared.pause_folder_monitoring {
                    self.shared.view.set_monitoring_paused(false);
                }
                Err(JobError::Spawn {
                    job_id: self.id(),
                    source,
                })
            }
        }
    }

    /// Pauses a running job or resumes a paused one; anything else is a no-op.
    pub fn set_paused(&self, paused: bool) {
        let machine = &self.shared.machine;
        let changed = {
            let guard = machine.lock_transitions();
            let now = Instant::now();
            let transition = if paused {
                machine.pause(&guard, now)
            } else {
                machine.resume(&guard, now)
            };
            transition.inspect(|transition| self.publish(*transition))
        };
        if changed.is_none() {
            return;
        }

        if paused {
            self.shared.operation.job_paused(self);
            tracing::debug!(job_event = "paused", job_id = %self.id(), "job paused");
        } else {
            self.shared.operation.job_resumed(self);
            tracing::debug!(job_event = "resumed", job_id = %self.id(), "job resumed");
        }
        self.deliver_transitions();
    }

    /// Interrupts a running or paused job. Safe to call from any thread and
    /// any state, listeners included; the worker unwinds at its next
    /// checkpoint.
    pub fn cancel(&self) {
        let machine = &self.shared.machine;
        let transitions = {
            let guard = machine.lock_transitions();
            let transitions = machine.interrupt(&guard, Instant::now());
            if transitions.is_empty() {
                return;
            }
            self.shared.cancel_flag.store(true, Ordering::Release);
            for transition in &transitions {
                self.publish(*transition);
            }
            transitions
        };

        if transitions
            .iter()
            .any(|transition| transition.next == JobState::Running)
        {
            self.shared.operation.job_resumed(self);
        }
        tracing::info!(job_event = "interrupted", job_id = %self.id(), "job interrupted");
        self.deliver_transitions();
    }

    /// Blocks until the worker has exited. Returns immediately for jobs that
    /// never started or were already waited on.
    pub fn wait(&self) -> Result<(), JobError> {
        let handle = lock(&self.shared.worker).take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| JobError::WorkerPanicked { job_id: self.id() }),
            None => Ok(()),
        }
    }

    pub fn add_listener<L: JobListener + 'static>(&self, listener: &Arc<L>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener<L: JobListener + 'static>(&self, listener: &Arc<L>) {
        self.shared.listeners.remove(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    pub fn progress(&self) -> JobProgress {
        let (state, timing) = self.shared.machine.snapshot();
        let now = Instant::now();
        let cursor = lock(&self.shared.cursor);
        JobProgress {
            state,
            current_index: cursor.index.unwrap_or(0),
            total: self.total_count(),
            current_file: cursor.file.clone(),
            effective_run_time: timing.effective_run_time(now),
            paused_time: timing.paused_time(now),
        }
    }

    pub fn timing(&self) -> ProgressTracker {
        self.shared.machine.timing()
    }

    /// Index of the top-level file being processed, `None` before the first.
    pub fn current_index(&self) -> Option<usize> {
        lock(&self.shared.cursor).index
    }

    pub fn current_file(&self) -> Option<FileRef> {
        lock(&self.shared.cursor).file.clone()
    }

    /// Announces the file about to be processed and parks while the job is
    /// paused. Returns false once the job has been interrupted.
    ///
    /// The run loop calls this for every top-level file; operations call it
    /// for nested files, which does not move the top-level index.
    pub fn next_file(&self, file: &FileRef) -> bool {
        lock(&self.shared.cursor).file = Some(Arc::clone(file));
        self.shared.machine.wait_while_paused() != JobState::Interrupted
    }

    pub(crate) fn set_current_index(&self, index: usize) {
        lock(&self.shared.cursor).index = Some(index);
    }

    /// Selects `file` in the active panel after the refresh, provided the
    /// active folder changed and the file still exists directly inside it.
    /// Pass an uncached handle so existence is checked afresh.
    pub fn select_file_when_finished(&self, file: FileRef) {
        *lock(&self.shared.file_to_select) = Some(file);
    }

    pub fn auto_unmark(&self) -> bool {
        self.shared.auto_unmark.load(Ordering::Acquire)
    }

    pub fn set_auto_unmark(&self, auto_unmark: bool) {
        self.shared.auto_unmark.store(auto_unmark, Ordering::Release);
    }

    pub fn auto_skip_errors(&self) -> bool {
        self.shared.auto_skip_errors.load(Ordering::Acquire)
    }

    pub fn set_auto_skip_errors(&self, auto_skip_errors: bool) {
        self.shared
            .auto_skip_errors
            .store(auto_skip_errors, Ordering::Release);
    }

    /// Rebinds the job to another file set. Ignored once the job started.
    pub fn set_files(&self, files: FileSet) -> bool {
        let _guard = self.shared.machine.lock_transitions();
        if self.state() != JobState::NotStarted {
            return false;
        }
        let files = files.cached();
        self.shared.total.store(files.len(), Ordering::Release);
        *lock(&self.shared.files) = files;
        true
    }

    /// Adjusts the count progress is measured against. Ignored once the job
    /// started.
    pub fn set_total_count(&self, total: usize) -> bool {
        let _guard = self.shared.machine.lock_transitions();
        if self.state() != JobState::NotStarted {
            return false;
        }
        self.shared.total.store(total, Ordering::Release);
        true
    }

    pub fn total_count(&self) -> usize {
        self.shared.total.load(Ordering::Acquire)
    }

    pub fn files(&self) -> FileSet {
        lock(&self.shared.files).clone()
    }

    pub fn base_folder(&self) -> Option<FileRef> {
        lock(&self.shared.files).base_folder().cloned()
    }

    /// Records a transition for listeners. Called with the transition lock
    /// held; `deliver_transitions` hands it out once the lock is released.
    pub(crate) fn publish(&self, transition: Transition) {
        tracing::debug!(
            job_event = "state_changed",
            job_id = %self.id(),
            previous = transition.previous.label(),
            next = transition.next.label(),
            "job state changed"
        );
        self.shared.listeners.enqueue(transition);
    }

    pub(crate) fn deliver_transitions(&self) {
        self.shared.listeners.deliver(self);
    }
}
