use crate::{FileJob, FileRef};

/// The work a job performs, plugged into the generic run loop.
///
/// `process_file` runs on the job's worker once per top-level file. Nested
/// files (folder contents and the like) are announced with
/// [`FileJob::next_file`], which is also where the worker parks while the job
/// is paused. Failures are resolved through [`FileJob::resolve`] and reported
/// as `false`; they never unwind out of the loop.
///
/// `job_paused` and `job_resumed` run on whichever thread changed the state.
pub trait JobOperation: Send + Sync {
    fn process_file(&self, file: &FileRef, job: &FileJob) -> bool;

    /// Whether `folder` may have been modified, checked once after the run.
    fn has_folder_changed(&self, folder: &FileRef) -> bool;

    fn job_started(&self, _job: &FileJob) {}

    /// Runs after the last file, before the job reports `Finished`.
    /// Skipped when the job was interrupted.
    fn job_completed(&self, _job: &FileJob) {}

    fn job_paused(&self, _job: &FileJob) {}

    fn job_resumed(&self, _job: &FileJob) {}

    /// Runs exactly once when the loop ends, completed or not.
    fn job_stopped(&self, _job: &FileJob) {}
}
