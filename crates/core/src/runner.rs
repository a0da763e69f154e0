use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::state::FinishAttempt;
use crate::{AlertKind, FileJob, FileRef, Panel, RefreshRequest};

pub(crate) const JOB_FINISHED_MESSAGE: &str = "Job finished";

/// Worker body: one pass over the job's files, then stop and refresh.
pub(crate) fn run_job(job: FileJob) {
    let files = job.files();
    let total_files = files.len();
    tracing::debug!(
        job_event = "started",
        job_id = %job.id(),
        total = total_files,
        "job worker started"
    );
    job.shared.operation.job_started(&job);

    if total_files == 0 {
        job.complete();
    }

    for (index, file) in files.iter().enumerate() {
        job.set_current_index(index);
        if !job.next_file(file) {
            break;
        }

        let success = job.shared.operation.process_file(file, &job);
        if job.is_interrupted() {
            break;
        }

        if success && job.auto_unmark() {
            job.shared.view.unmark(file);
        }

        if index + 1 >= total_files {
            job.set_current_index(total_files);
            job.complete();
        }
    }

    job.stop();
    job.refresh_panels();
}

impl FileJob {
    /// Completion path: the hook still observes `Running`, and `Finished` is
    /// only published afterwards unless the job was interrupted meanwhile.
    fn complete(&self) {
        self.shared.machine.mark_ended(Instant::now());
        self.shared.operation.job_completed(self);
        if self.shared.notify_on_completion {
            self.shared.alerts.notify(
                AlertKind::JobCompleted,
                self.title(),
                JOB_FINISHED_MESSAGE,
            );
        }

        loop {
            let guard = self.shared.machine.lock_transitions();
            match self.shared.machine.finish(&guard) {
                FinishAttempt::Finished(transition) => {
                    self.publish(transition);
                    drop(guard);
                    self.deliver_transitions();
                    let progress = self.progress();
                    tracing::info!(
                        job_event = "finished",
                        job_id = %self.id(),
                        total = progress.total,
                        effective_ms = progress.effective_run_time.as_millis() as u64,
                        paused_ms = progress.paused_time.as_millis() as u64,
                        "job finished"
                    );
                    return;
                }
                FinishAttempt::Interrupted => return,
                FinishAttempt::Paused => {
                    drop(guard);
                    self.shared.machine.wait_while_paused();
                }
            }
        }
    }

    /// Runs the stop hook the first time it is called.
    pub(crate) fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.machine.mark_ended(Instant::now());
        self.shared.operation.job_stopped(self);
        tracing::debug!(
            job_event = "stopped",
            job_id = %self.id(),
            state = self.state().label(),
            "job stopped"
        );
    }

    fn refresh_panels(&self) {
        let view = &self.shared.view;
        let operation = &self.shared.operation;
        let active = view.current_folder(Panel::Active);
        let inactive = view.current_folder(Panel::Inactive);

        let inactive_changed = inactive
            .as_ref()
            .is_some_and(|folder| operation.has_folder_changed(folder));
        let active_changed = active
            .as_ref()
            .is_some_and(|folder| operation.has_folder_changed(folder));

        let hint = self
            .shared
            .file_to_select
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let select = match (&active, hint) {
            (Some(folder), Some(file)) if active_changed => select_hint(folder, file),
            _ => None,
        };

        let request = RefreshRequest {
            active_changed,
            inactive_changed,
            select,
        };
        tracing::debug!(
            job_event = "refresh",
            job_id = %self.id(),
            active_changed,
            inactive_changed,
            selecting = request.select.is_some(),
            "refreshing panels"
        );
        view.refresh(&request);
        if self.shared.pause_folder_monitoring {
            view.set_monitoring_paused(false);
        }
    }
}

fn select_hint(active_folder: &FileRef, file: FileRef) -> Option<FileRef> {
    let in_active_folder = file
        .parent()
        .is_some_and(|parent| same_folder(parent.path(), active_folder.path()));
    (in_active_folder && file.exists()).then_some(file)
}

/// Compares component-wise first, then by canonical path when both resolve.
fn same_folder(left: &Path, right: &Path) -> bool {
    if left == right {
        return true;
    }
    match (fs::canonicalize(left), fs::canonicalize(right)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}
