#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use fj_core::{
    ChannelDecisionMaker, DecisionMaker, DecisionOutcome, DecisionPrompt, DecisionRequest,
    FileHandle, FileJob, FileRef, FileSet, JobConfig, JobListener, JobOperation, JobState, Panel,
    PanelView, RefreshRequest,
};

#[derive(Debug)]
struct VirtualFile {
    path: PathBuf,
    exists: bool,
}

impl FileHandle for VirtualFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn size(&self) -> u64 {
        0
    }

    fn modified(&self) -> Option<SystemTime> {
        None
    }

    fn is_dir(&self) -> bool {
        false
    }

    fn parent(&self) -> Option<FileRef> {
        self.path.parent().map(|parent| virtual_file(parent, true))
    }

    fn children(&self) -> io::Result<Vec<FileRef>> {
        Ok(Vec::new())
    }
}

fn virtual_file(path: impl Into<PathBuf>, exists: bool) -> FileRef {
    Arc::new(VirtualFile {
        path: path.into(),
        exists,
    })
}

fn virtual_set(names: &[&str]) -> FileSet {
    FileSet::new(
        Some(virtual_file("/work/src", true)),
        names
            .iter()
            .map(|name| virtual_file(Path::new("/work/src").join(name), true))
            .collect(),
    )
}

type Step = Box<dyn Fn(&FileRef, &FileJob) -> bool + Send + Sync>;

struct RecordingOperation {
    processed: Mutex<Vec<String>>,
    started: AtomicUsize,
    completed: AtomicUsize,
    stopped: AtomicUsize,
    completion_view: Mutex<Option<(JobState, Option<usize>)>>,
    changed_folder: PathBuf,
    step: Step,
}

impl RecordingOperation {
    fn new(step: Step) -> Self {
        Self {
            processed: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            completion_view: Mutex::new(None),
            changed_folder: PathBuf::from("/work/dst"),
            step,
        }
    }

    fn succeeding() -> Self {
        Self::new(Box::new(|_, _| true))
    }

    fn processed(&self) -> Vec<String> {
        self.processed.lock().expect("processed lock").clone()
    }
}

impl JobOperation for RecordingOperation {
    fn process_file(&self, file: &FileRef, job: &FileJob) -> bool {
        let success = (self.step)(file, job);
        self.processed
            .lock()
            .expect("processed lock")
            .push(file.name());
        success
    }

    fn has_folder_changed(&self, folder: &FileRef) -> bool {
        folder.path() == self.changed_folder
    }

    fn job_started(&self, _job: &FileJob) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn job_completed(&self, job: &FileJob) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        *self.completion_view.lock().expect("completion lock") =
            Some((job.state(), job.current_index()));
    }

    fn job_stopped(&self, _job: &FileJob) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingListener {
    transitions: Mutex<Vec<(JobState, JobState)>>,
}

impl RecordingListener {
    fn transitions(&self) -> Vec<(JobState, JobState)> {
        self.transitions.lock().expect("transitions lock").clone()
    }
}

impl JobListener for RecordingListener {
    fn job_state_changed(&self, _job: &FileJob, previous: JobState, next: JobState) {
        self.transitions
            .lock()
            .expect("transitions lock")
            .push((previous, next));
    }
}

struct ScriptedDecisions {
    answers: Mutex<VecDeque<Option<DecisionOutcome>>>,
    asked: AtomicUsize,
}

impl ScriptedDecisions {
    fn new(answers: Vec<Option<DecisionOutcome>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: AtomicUsize::new(0),
        }
    }
}

impl DecisionMaker for ScriptedDecisions {
    fn ask(&self, _request: &DecisionRequest, _cancel_flag: &AtomicBool) -> Option<DecisionOutcome> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .expect("answers lock")
            .pop_front()
            .flatten()
    }
}

#[derive(Default)]
struct RecordingView {
    active: Option<FileRef>,
    inactive: Option<FileRef>,
    unmarked: Mutex<Vec<String>>,
    refreshes: Mutex<Vec<RefreshRequest>>,
    monitoring: Mutex<Vec<bool>>,
}

impl PanelView for RecordingView {
    fn current_folder(&self, panel: Panel) -> Option<FileRef> {
        match panel {
            Panel::Active => self.active.clone(),
            Panel::Inactive => self.inactive.clone(),
        }
    }

    fn unmark(&self, file: &FileRef) {
        self.unmarked.lock().expect("unmarked lock").push(file.name());
    }

    fn refresh(&self, request: &RefreshRequest) {
        self.refreshes
            .lock()
            .expect("refresh lock")
            .push(request.clone());
    }

    fn set_monitoring_paused(&self, paused: bool) {
        self.monitoring.lock().expect("monitoring lock").push(paused);
    }
}

fn config_with(decisions: Arc<dyn DecisionMaker>) -> JobConfig {
    JobConfig {
        title: String::from("test job"),
        decisions,
        ..JobConfig::default()
    }
}

fn start_and_wait(job: &FileJob) {
    assert!(job.start().expect("worker should spawn"));
    job.wait().expect("worker should exit cleanly");
}

fn wait_for_state(job: &FileJob, state: JobState) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while job.state() != state {
        assert!(
            Instant::now() < deadline,
            "job should reach {state}, still {}",
            job.state()
        );
        thread::sleep(Duration::from_millis(2));
    }
}

/// Operation step that parks on `name` until the test releases it.
fn gate(name: &'static str) -> (Step, Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (proceed_tx, proceed_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let proceed_rx = Mutex::new(proceed_rx);
    let step: Step = Box::new(move |file, _job| {
        if file.name() == name {
            entered_tx
                .lock()
                .expect("entered lock")
                .send(())
                .expect("test should be listening");
            proceed_rx
                .lock()
                .expect("proceed lock")
                .recv_timeout(Duration::from_secs(2))
                .expect("test should release the gate");
        }
        true
    });
    (step, entered_rx, proceed_tx)
}

#[test]
fn job_finishes_and_fires_each_hook_once() {
    let operation = Arc::new(RecordingOperation::succeeding());
    let job = FileJob::new(
        virtual_set(&["a", "b", "c"]),
        operation.clone(),
        JobConfig::default(),
    );
    let listener = Arc::new(RecordingListener::default());
    job.add_listener(&listener);
    assert_eq!(job.progress().fraction(), 0.0);
    assert_eq!(job.current_index(), None);

    start_and_wait(&job);

    assert_eq!(job.state(), JobState::Finished);
    assert_eq!(operation.processed(), vec!["a", "b", "c"]);
    assert_eq!(operation.started.load(Ordering::SeqCst), 1);
    assert_eq!(operation.completed.load(Ordering::SeqCst), 1);
    assert_eq!(operation.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(
        *operation.completion_view.lock().expect("completion lock"),
        Some((JobState::Running, Some(3))),
        "completion hook should run before Finished, after the index moved past the end"
    );
    assert_eq!(
        listener.transitions(),
        vec![
            (JobState::NotStarted, JobState::Running),
            (JobState::Running, JobState::Finished),
        ]
    );

    let progress = job.progress();
    assert_eq!(progress.current_index, 3);
    assert_eq!(progress.total, 3);
    assert_eq!(progress.fraction(), 1.0);
    assert_eq!(progress.status_line(), "Processing 'c'");
}

#[test]
fn second_start_is_a_noop() {
    let (step, entered_rx, proceed_tx) = gate("a");
    let operation = Arc::new(RecordingOperation::new(step));
    let job = FileJob::new(virtual_set(&["a"]), operation.clone(), JobConfig::default());

    assert!(job.start().expect("worker should spawn"));
    entered_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("worker should reach the gate");
    assert!(!job.start().expect("second start should not fail"));
    proceed_tx.send(()).expect("gate should release");
    job.wait().expect("worker should exit cleanly");

    assert!(!job.start().expect("start after finish should not fail"));
    assert_eq!(operation.started.load(Ordering::SeqCst), 1);
    assert_eq!(operation.processed(), vec!["a"]);
    assert_eq!(job.state(), JobState::Finished);
}

#[test]
fn retry_decision_reprocesses_failed_file() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let step: Step = {
        let attempts = Arc::clone(&attempts);
        Box::new(move |file, job| {
            if file.name() != "b" {
                return true;
            }
            loop {
                if attempts.fetch_add(1, Ordering::SeqCst) > 0 {
                    return true;
                }
                match job.resolve(DecisionRequest::error("Copy failed", "device busy")) {
                    DecisionOutcome::Retry => continue,
                    _ => return false,
                }
            }
        })
    };
    let operation = Arc::new(RecordingOperation::new(step));
    let decisions = Arc::new(ScriptedDecisions::new(vec![Some(DecisionOutcome::Retry)]));
    let job = FileJob::new(
        virtual_set(&["a", "b", "c"]),
        operation.clone(),
        config_with(decisions.clone()),
    );
    let listener = Arc::new(RecordingListener::default());
    job.add_listener(&listener);

    start_and_wait(&job);

    assert_eq!(job.state(), JobState::Finished);
    assert_eq!(job.current_index(), Some(3));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(decisions.asked.load(Ordering::SeqCst), 1);
    assert_eq!(operation.completed.load(Ordering::SeqCst), 1);
    assert_eq!(
        listener.transitions(),
        vec![
            (JobState::NotStarted, JobState::Running),
            (JobState::Running, JobState::Paused),
            (JobState::Paused, JobState::Running),
            (JobState::Running, JobState::Finished),
        ]
    );
}

#[test]
fn cancel_after_second_file_stops_before_completion() {
    let (step, entered_rx, proceed_tx) = gate("c");
    let operation = Arc::new(RecordingOperation::new(step));
    let view = Arc::new(RecordingView {
        active: Some(virtual_file("/work/dst", true)),
        inactive: Some(virtual_file("/work/src", true)),
        ..RecordingView::default()
    });
    let job = FileJob::new(
        virtual_set(&["a", "b", "c", "d", "e"]),
        operation.clone(),
        JobConfig {
            view: view.clone(),
            ..JobConfig::default()
        },
    );
    let listener = Arc::new(RecordingListener::default());
    job.add_listener(&listener);

    assert!(job.start().expect("worker should spawn"));
    entered_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("worker should reach the third file");
    job.cancel();
    job.cancel();
    assert_eq!(job.state(), JobState::Interrupted);
    proceed_tx.send(()).expect("gate should release");
    job.wait().expect("worker should exit cleanly");

    assert_eq!(job.state(), JobState::Interrupted);
    assert_eq!(job.current_index(), Some(2));
    assert_eq!(operation.processed(), vec!["a", "b", "c"]);
    assert_eq!(operation.completed.load(Ordering::SeqCst), 0);
    assert_eq!(operation.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(
        listener.transitions(),
        vec![
            (JobState::NotStarted, JobState::Running),
            (JobState::Running, JobState::Interrupted),
        ]
    );
    assert_eq!(
        *view.monitoring.lock().expect("monitoring lock"),
        vec![true, false]
    );
    let refreshes = view.refreshes.lock().expect("refresh lock");
    assert_eq!(refreshes.len(), 1, "refresh should fire once after a cancel");
    assert!(refreshes[0].active_changed);
    assert!(!refreshes[0].inactive_changed);
    assert_eq!(
        *view.unmarked.lock().expect("unmarked lock"),
        vec!["a", "b"]
    );
}

#[test]
fn pause_holds_worker_at_next_checkpoint_and_is_accounted() {
    let (step, entered_rx, proceed_tx) = gate("a");
    let operation = Arc::new(RecordingOperation::new(step));
    let job = FileJob::new(
        virtual_set(&["a", "b"]),
        operation.clone(),
        JobConfig::default(),
    );

    let wall_start = Instant::now();
    assert!(job.start().expect("worker should spawn"));
    entered_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("worker should reach the gate");

    let paused_at = Instant::now();
    job.set_paused(true);
    job.set_paused(true);
    assert_eq!(job.state(), JobState::Paused);
    proceed_tx.send(()).expect("gate should release");

    thread::sleep(Duration::from_millis(150));
    assert_eq!(
        operation.processed(),
        vec!["a"],
        "worker should park before the next file"
    );
    assert_eq!(job.current_index(), Some(1));
    assert_eq!(job.state(), JobState::Paused);

    job.set_paused(false);
    let resumed_at = Instant::now();
    job.wait().expect("worker should exit cleanly");
    let wall = wall_start.elapsed();

    assert_eq!(job.state(), JobState::Finished);
    assert_eq!(operation.processed(), vec!["a", "b"]);

    let gap = resumed_at - paused_at;
    let timing = job.timing();
    let paused = timing.paused_time(Instant::now());
    assert!(paused <= gap, "paused {paused:?} should fit in gap {gap:?}");
    assert!(
        paused + Duration::from_millis(50) >= gap,
        "paused {paused:?} should be close to gap {gap:?}"
    );
    let effective = timing.effective_run_time(Instant::now());
    assert!(effective + paused <= wall);
    assert_eq!(job.progress().paused_time, paused);
}

#[test]
fn cancel_while_paused_reaches_interrupted() {
    let (step, entered_rx, proceed_tx) = gate("a");
    let operation = Arc::new(RecordingOperation::new(step));
    let job = FileJob::new(
        virtual_set(&["a", "b", "c"]),
        operation.clone(),
        JobConfig::default(),
    );
    let listener = Arc::new(RecordingListener::default());
    job.add_listener(&listener);

    assert!(job.start().expect("worker should spawn"));
    entered_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("worker should reach the gate");
    job.set_paused(true);
    proceed_tx.send(()).expect("gate should release");
    thread::sleep(Duration::from_millis(50));

    job.cancel();
    job.wait().expect("worker should exit cleanly");

    assert_eq!(job.state(), JobState::Interrupted);
    assert_eq!(operation.processed(), vec!["a"]);
    assert_eq!(operation.completed.load(Ordering::SeqCst), 0);
    assert_eq!(operation.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(
        listener.transitions(),
        vec![
            (JobState::NotStarted, JobState::Running),
            (JobState::Running, JobState::Paused),
            (JobState::Paused, JobState::Running),
            (JobState::Running, JobState::Interrupted),
        ]
    );
    assert_eq!(job.timing().pause_started_at(), None);
}

#[test]
fn skip_all_answers_later_failures_without_prompting() {
    let step: Step = Box::new(|_file, job| {
        let outcome = job.resolve(DecisionRequest::error("Delete failed", "read-only"));
        assert_eq!(outcome, DecisionOutcome::Skip);
        false
    });
    let operation = Arc::new(RecordingOperation::new(step));
    let decisions = Arc::new(ScriptedDecisions::new(vec![Some(DecisionOutcome::SkipAll)]));
    let view = Arc::new(RecordingView::default());
    let job = FileJob::new(
        virtual_set(&["a", "b", "c", "d"]),
        operation.clone(),
        JobConfig {
            view: view.clone(),
            ..config_with(decisions.clone())
        },
    );

    start_and_wait(&job);

    assert_eq!(job.state(), JobState::Finished);
    assert!(job.auto_skip_errors());
    assert_eq!(decisions.asked.load(Ordering::SeqCst), 1);
    assert_eq!(operation.processed().len(), 4);
    assert!(
        view.unmarked.lock().expect("unmarked lock").is_empty(),
        "failed files should stay marked"
    );
}

#[test]
fn sticky_skip_does_not_answer_requests_without_skip() {
    let answers = Arc::new(Mutex::new(Vec::new()));
    let step: Step = {
        let answers = Arc::clone(&answers);
        Box::new(move |_file, job| {
            let request = DecisionRequest::new(
                "Overwrite?",
                "target exists",
                [DecisionOutcome::Overwrite, DecisionOutcome::Cancel],
            );
            answers
                .lock()
                .expect("answers lock")
                .push(job.resolve(request));
            true
        })
    };
    let decisions = Arc::new(ScriptedDecisions::new(vec![Some(DecisionOutcome::Overwrite)]));
    let job = FileJob::new(
        virtual_set(&["a"]),
        Arc::new(RecordingOperation::new(step)),
        JobConfig {
            auto_skip_errors: true,
            ..config_with(decisions.clone())
        },
    );

    start_and_wait(&job);

    assert_eq!(decisions.asked.load(Ordering::SeqCst), 1);
    assert_eq!(
        *answers.lock().expect("answers lock"),
        vec![DecisionOutcome::Overwrite]
    );
    assert_eq!(job.state(), JobState::Finished);
}

#[test]
fn dismissed_or_unoffered_answer_cancels_job() {
    for answer in [None, Some(DecisionOutcome::Append)] {
        let step: Step = Box::new(|file, job| {
            if file.name() == "a" {
                assert_eq!(
                    job.resolve(DecisionRequest::error("Copy failed", "eof")),
                    DecisionOutcome::Cancel
                );
                return false;
            }
            true
        });
        let operation = Arc::new(RecordingOperation::new(step));
        let decisions = Arc::new(ScriptedDecisions::new(vec![answer]));
        let job = FileJob::new(
            virtual_set(&["a", "b"]),
            operation.clone(),
            config_with(decisions),
        );

        start_and_wait(&job);

        assert_eq!(job.state(), JobState::Interrupted);
        assert_eq!(operation.processed(), vec!["a"]);
        assert_eq!(operation.completed.load(Ordering::SeqCst), 0);
        assert_eq!(operation.stopped.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn cancel_unblocks_outstanding_decision() {
    let (prompt_tx, prompt_rx) = mpsc::channel::<DecisionPrompt>();
    let decisions = Arc::new(ChannelDecisionMaker::with_poll_interval(
        prompt_tx,
        Duration::from_millis(5),
    ));
    let step: Step = Box::new(|_file, job| {
        job.resolve(DecisionRequest::error("Copy failed", "eof"));
        false
    });
    let operation = Arc::new(RecordingOperation::new(step));
    let job = FileJob::new(
        virtual_set(&["a", "b"]),
        operation.clone(),
        config_with(decisions),
    );

    assert!(job.start().expect("worker should spawn"));
    let prompt = prompt_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("worker should ask for a decision");
    assert_eq!(prompt.request.job_id, job.id());
    assert_eq!(prompt.request.title, "Copy failed");
    assert_eq!(job.state(), JobState::Paused);

    job.cancel();
    job.wait().expect("worker should exit cleanly");

    assert_eq!(job.state(), JobState::Interrupted);
    assert_eq!(operation.processed(), vec!["a"]);
    assert!(!prompt.answer(DecisionOutcome::Retry));
}

#[test]
fn rebinding_cached_files_keeps_wrapper_identity() {
    let first = FileJob::new(
        virtual_set(&["a", "b"]),
        Arc::new(RecordingOperation::succeeding()),
        JobConfig::default(),
    );
    let second = FileJob::new(
        first.files(),
        Arc::new(RecordingOperation::succeeding()),
        JobConfig::default(),
    );

    let first_files = first.files();
    let second_files = second.files();
    for (left, right) in first_files.iter().zip(second_files.iter()) {
        assert!(left.is_cached());
        assert!(Arc::ptr_eq(left, right));
    }
    assert!(Arc::ptr_eq(
        &first.base_folder().expect("base folder"),
        &second.base_folder().expect("base folder")
    ));

    assert!(second.set_files(first.files()));
    assert!(Arc::ptr_eq(
        first.files().get(0).expect("first file"),
        second.files().get(0).expect("first file")
    ));
}

#[test]
fn files_and_total_are_frozen_once_started() {
    let operation = Arc::new(RecordingOperation::succeeding());
    let job = FileJob::new(virtual_set(&["a"]), operation.clone(), JobConfig::default());
    assert!(job.set_total_count(4));
    assert_eq!(job.total_count(), 4);
    assert!(job.set_files(virtual_set(&["x", "y"])));
    assert_eq!(job.total_count(), 2);

    start_and_wait(&job);

    assert!(!job.set_files(virtual_set(&["z"])));
    assert!(!job.set_total_count(9));
    assert_eq!(job.total_count(), 2);
    assert_eq!(operation.processed(), vec!["x", "y"]);
}

struct CountingListener {
    calls: Arc<AtomicUsize>,
}

impl JobListener for CountingListener {
    fn job_state_changed(&self, _job: &FileJob, _previous: JobState, _next: JobState) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn unreachable_listener_stops_receiving() {
    let job = FileJob::new(
        virtual_set(&["a", "b"]),
        Arc::new(RecordingOperation::succeeding()),
        JobConfig::default(),
    );
    let kept = Arc::new(RecordingListener::default());
    let transient_calls = Arc::new(AtomicUsize::new(0));
    let transient = Arc::new(CountingListener {
        calls: Arc::clone(&transient_calls),
    });
    job.add_listener(&kept);
    job.add_listener(&transient);
    assert_eq!(job.listener_count(), 2);

    drop(transient);
    start_and_wait(&job);

    assert_eq!(transient_calls.load(Ordering::SeqCst), 0);
    assert_eq!(job.listener_count(), 1);
    assert_eq!(
        kept.transitions(),
        vec![
            (JobState::NotStarted, JobState::Running),
            (JobState::Running, JobState::Finished),
        ]
    );
}

#[test]
fn empty_job_finishes_immediately() {
    let operation = Arc::new(RecordingOperation::succeeding());
    let job = FileJob::new(FileSet::default(), operation.clone(), JobConfig::default());

    start_and_wait(&job);

    assert_eq!(job.state(), JobState::Finished);
    assert_eq!(operation.completed.load(Ordering::SeqCst), 1);
    assert_eq!(operation.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(job.progress().fraction(), 1.0);
}

#[test]
fn cancel_before_start_is_a_noop() {
    let job = FileJob::new(
        virtual_set(&["a"]),
        Arc::new(RecordingOperation::succeeding()),
        JobConfig::default(),
    );
    job.cancel();
    job.set_paused(true);
    assert_eq!(job.state(), JobState::NotStarted);
    assert_eq!(job.progress().effective_run_time, Duration::ZERO);
    job.wait().expect("waiting on an unstarted job should return");

    start_and_wait(&job);
    assert_eq!(job.state(), JobState::Finished);
}

#[test]
fn refresh_reports_changed_panels_unmarks_and_selects() {
    let step: Step = Box::new(|file, job| {
        if file.name() == "b" {
            job.select_file_when_finished(virtual_file("/work/dst/b", true));
            return false;
        }
        true
    });
    let view = Arc::new(RecordingView {
        active: Some(virtual_file("/work/dst", true)),
        inactive: Some(virtual_file("/work/src", true)),
        ..RecordingView::default()
    });
    let job = FileJob::new(
        virtual_set(&["a", "b", "c"]),
        Arc::new(RecordingOperation::new(step)),
        JobConfig {
            view: view.clone(),
            ..JobConfig::default()
        },
    );

    start_and_wait(&job);

    assert_eq!(
        *view.unmarked.lock().expect("unmarked lock"),
        vec!["a", "c"]
    );
    assert_eq!(
        *view.monitoring.lock().expect("monitoring lock"),
        vec![true, false]
    );
    let refreshes = view.refreshes.lock().expect("refresh lock");
    assert_eq!(refreshes.len(), 1);
    assert!(refreshes[0].active_changed);
    assert!(!refreshes[0].inactive_changed);
    assert_eq!(
        refreshes[0]
            .select
            .as_ref()
            .map(|file| file.path().to_path_buf()),
        Some(PathBuf::from("/work/dst/b"))
    );
}

#[test]
fn select_hint_needs_existing_file_in_active_folder() {
    let cases = [
        (virtual_file("/work/other/b", true), true),
        (virtual_file("/work/dst/gone", false), true),
        (virtual_file("/work/dst/b", true), false),
    ];
    for (hint, auto_unmark) in cases {
        let hint = Mutex::new(Some(hint));
        let step: Step = Box::new(move |_file, job| {
            if let Some(file) = hint.lock().expect("hint lock").take() {
                job.select_file_when_finished(file);
            }
            true
        });
        let view = Arc::new(RecordingView {
            active: Some(virtual_file("/work/dst", true)),
            ..RecordingView::default()
        });
        let job = FileJob::new(
            virtual_set(&["a"]),
            Arc::new(RecordingOperation::new(step)),
            JobConfig {
                view: view.clone(),
                auto_unmark,
                ..JobConfig::default()
            },
        );

        start_and_wait(&job);

        let refreshes = view.refreshes.lock().expect("refresh lock");
        assert_eq!(refreshes.len(), 1);
        let expected_unmarked: Vec<String> = if auto_unmark {
            vec![String::from("a")]
        } else {
            Vec::new()
        };
        assert_eq!(*view.unmarked.lock().expect("unmarked lock"), expected_unmarked);
        if auto_unmark {
            assert!(refreshes[0].select.is_none());
        } else {
            assert!(refreshes[0].select.is_some());
        }
    }
}

#[test]
fn listeners_observe_pause_from_another_thread_in_order() {
    let (step, entered_rx, proceed_tx) = gate("b");
    let job = FileJob::new(
        virtual_set(&["a", "b", "c"]),
        Arc::new(RecordingOperation::new(step)),
        JobConfig::default(),
    );
    let listener = Arc::new(RecordingListener::default());
    job.add_listener(&listener);

    assert!(job.start().expect("worker should spawn"));
    entered_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("worker should reach the gate");

    let controller = {
        let job = job.clone();
        thread::spawn(move || {
            job.set_paused(true);
            job.set_paused(false);
        })
    };
    controller.join().expect("controller should join");
    proceed_tx.send(()).expect("gate should release");
    wait_for_state(&job, JobState::Finished);
    job.wait().expect("worker should exit cleanly");

    assert_eq!(
        listener.transitions(),
        vec![
            (JobState::NotStarted, JobState::Running),
            (JobState::Running, JobState::Paused),
            (JobState::Paused, JobState::Running),
            (JobState::Running, JobState::Finished),
        ]
    );
}

#[test]
fn interrupted_job_still_selects_hinted_file() {
    let step: Step = Box::new(|file, job| match file.name().as_str() {
        "a" => {
            job.select_file_when_finished(virtual_file("/work/dst/a", true));
            true
        }
        "b" => {
            job.resolve(DecisionRequest::error("Copy failed", "eof"));
            false
        }
        _ => true,
    });
    let operation = Arc::new(RecordingOperation::new(step));
    let view = Arc::new(RecordingView {
        active: Some(virtual_file("/work/dst", true)),
        ..RecordingView::default()
    });
    let decisions = Arc::new(ScriptedDecisions::new(vec![Some(DecisionOutcome::Cancel)]));
    let job = FileJob::new(
        virtual_set(&["a", "b", "c"]),
        operation.clone(),
        JobConfig {
            view: view.clone(),
            ..config_with(decisions)
        },
    );

    start_and_wait(&job);

    assert_eq!(job.state(), JobState::Interrupted);
    assert_eq!(operation.processed(), vec!["a", "b"]);
    let refreshes = view.refreshes.lock().expect("refresh lock");
    assert_eq!(refreshes.len(), 1);
    assert!(refreshes[0].active_changed);
    assert_eq!(
        refreshes[0]
            .select
            .as_ref()
            .map(|file| file.path().to_path_buf()),
        Some(PathBuf::from("/work/dst/a"))
    );
}

/// Cancels the job as soon as it is paused.
struct CancelOnPause;

impl JobListener for CancelOnPause {
    fn job_state_changed(&self, job: &FileJob, _previous: JobState, next: JobState) {
        if next == JobState::Paused {
            job.cancel();
        }
    }
}

#[test]
fn listener_may_cancel_from_inside_a_notification() {
    let (step, entered_rx, proceed_tx) = gate("a");
    let operation = Arc::new(RecordingOperation::new(step));
    let job = FileJob::new(
        virtual_set(&["a", "b"]),
        operation.clone(),
        JobConfig::default(),
    );
    let recorder = Arc::new(RecordingListener::default());
    let canceller = Arc::new(CancelOnPause);
    job.add_listener(&recorder);
    job.add_listener(&canceller);

    assert!(job.start().expect("worker should spawn"));
    entered_rx
        .recv_timeout(Duration::from_secs(1))
        .expect("worker should reach the gate");

    let (paused_tx, paused_rx) = mpsc::channel();
    let pauser = {
        let job = job.clone();
        thread::spawn(move || {
            job.set_paused(true);
            paused_tx.send(()).expect("test should be listening");
        })
    };
    paused_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("set_paused should return while a listener cancels");
    pauser.join().expect("pauser should join");

    assert_eq!(job.state(), JobState::Interrupted);
    proceed_tx.send(()).expect("gate should release");
    job.wait().expect("worker should exit cleanly");

    assert_eq!(job.state(), JobState::Interrupted);
    assert_eq!(operation.processed(), vec!["a"]);
    assert_eq!(operation.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(
        recorder.transitions(),
        vec![
            (JobState::NotStarted, JobState::Running),
            (JobState::Running, JobState::Paused),
            (JobState::Paused, JobState::Running),
            (JobState::Running, JobState::Interrupted),
        ]
    );

    job.set_paused(true);
    job.cancel();
    assert_eq!(recorder.transitions().len(), 4);
}
