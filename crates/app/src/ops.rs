use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use filetime::FileTime;
use fj_core::{DecisionOutcome, DecisionRequest, FileJob, FileRef, JobOperation, LocalFile};

const COLLISION_OUTCOMES: [DecisionOutcome; 6] = [
    DecisionOutcome::Skip,
    DecisionOutcome::SkipAll,
    DecisionOutcome::Overwrite,
    DecisionOutcome::OverwriteAll,
    DecisionOutcome::Append,
    DecisionOutcome::Cancel,
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WriteMode {
    Create,
    Overwrite,
    /// Continue an interrupted copy from the destination's current length.
    Resume,
}

/// Copies every top-level file, folders recursively, into one destination
/// folder.
#[derive(Debug)]
pub struct CopyOperation {
    destination_dir: PathBuf,
    overwrite_all: AtomicBool,
    selected: AtomicBool,
}

impl CopyOperation {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            destination_dir: destination_dir.into(),
            overwrite_all: AtomicBool::new(false),
            selected: AtomicBool::new(false),
        }
    }

    fn copy_entry(&self, source: &FileRef, destination: &Path, job: &FileJob) -> bool {
        if !source.is_dir() {
            return self.copy_file(source, destination, job);
        }

        if destination.starts_with(source.path()) {
            let request = DecisionRequest::new(
                "Cannot copy folder",
                format!(
                    "cannot copy directory into itself: {} -> {}",
                    source.path().to_string_lossy(),
                    destination.to_string_lossy()
                ),
                [DecisionOutcome::Skip, DecisionOutcome::Cancel],
            );
            job.resolve(request);
            return false;
        }

        if with_retry(job, "Cannot create folder", || fs::create_dir_all(destination)).is_none() {
            return false;
        }
        let Some(children) = with_retry(job, "Cannot read folder", || source.children()) else {
            return false;
        };

        let mut success = true;
        for child in &children {
            if !job.next_file(child) {
                return false;
            }
            success &= self.copy_entry(child, &destination.join(child.name()), job);
            if job.is_interrupted() {
                return false;
            }
        }
        success
    }

    fn copy_file(&self, source: &FileRef, destination: &Path, job: &FileJob) -> bool {
        let Some(mode) = self.write_mode(destination, job) else {
            return false;
        };
        with_retry(job, "Copy failed", || {
            copy_contents(source.path(), destination, mode)
        })
        .is_some()
    }

    /// Settles a collision with an existing destination. `None` skips the file.
    fn write_mode(&self, destination: &Path, job: &FileJob) -> Option<WriteMode> {
        if fs::symlink_metadata(destination).is_err() {
            return Some(WriteMode::Create);
        }
        if self.overwrite_all.load(Ordering::Acquire) {
            return Some(WriteMode::Overwrite);
        }

        let request = DecisionRequest::new(
            "File already exists",
            format!("'{}' already exists", destination.to_string_lossy()),
            COLLISION_OUTCOMES,
        );
        match job.resolve(request) {
            DecisionOutcome::Overwrite => Some(WriteMode::Overwrite),
            DecisionOutcome::OverwriteAll => {
                self.overwrite_all.store(true, Ordering::Release);
                Some(WriteMode::Overwrite)
            }
            DecisionOutcome::Append => Some(WriteMode::Resume),
            _ => None,
        }
    }
}

impl JobOperation for CopyOperation {
    fn process_file(&self, file: &FileRef, job: &FileJob) -> bool {
        let destination = match destination_path(file.path(), &self.destination_dir) {
            Ok(destination) => destination,
            Err(error) => {
                job.resolve(DecisionRequest::new(
                    "Copy failed",
                    error.to_string(),
                    [DecisionOutcome::Skip, DecisionOutcome::SkipAll, DecisionOutcome::Cancel],
                ));
                return false;
            }
        };

        let copied = self.copy_entry(file, &destination, job);
        if copied && !self.selected.swap(true, Ordering::AcqRel) {
            job.select_file_when_finished(LocalFile::shared(destination));
        }
        copied
    }

    fn has_folder_changed(&self, folder: &FileRef) -> bool {
        folder.path() == self.destination_dir
    }
}

/// Deletes every top-level file, emptying folders depth first.
#[derive(Debug)]
pub struct DeleteOperation {
    parent_folders: Vec<PathBuf>,
}

impl DeleteOperation {
    pub fn new<'a>(targets: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut parent_folders: Vec<PathBuf> = targets
            .into_iter()
            .filter_map(Path::parent)
            .map(Path::to_path_buf)
            .collect();
        parent_folders.sort();
        parent_folders.dedup();
        Self { parent_folders }
    }

    fn delete_entry(&self, file: &FileRef, job: &FileJob) -> bool {
        if file.is_dir() {
            let Some(children) = with_retry(job, "Cannot read folder", || file.children()) else {
                return false;
            };
            let mut emptied = true;
            for child in &children {
                if !job.next_file(child) {
                    return false;
                }
                emptied &= self.delete_entry(child, job);
                if job.is_interrupted() {
                    return false;
                }
            }
            if !emptied {
                return false;
            }
            return with_retry(job, "Delete failed", || fs::remove_dir(file.path())).is_some();
        }

        with_retry(job, "Delete failed", || fs::remove_file(file.path())).is_some()
    }
}

impl JobOperation for DeleteOperation {
    fn process_file(&self, file: &FileRef, job: &FileJob) -> bool {
        self.delete_entry(file, job)
    }

    fn has_folder_changed(&self, folder: &FileRef) -> bool {
        self.parent_folders
            .iter()
            .any(|parent| parent.as_path() == folder.path())
    }
}

/// Runs `attempt` until it succeeds or the job's decision is anything but
/// `Retry`.
fn with_retry<T>(
    job: &FileJob,
    title: &str,
    mut attempt: impl FnMut() -> io::Result<T>,
) -> Option<T> {
    loop {
        match attempt() {
            Ok(value) => return Some(value),
            Err(error) => {
                tracing::debug!(
                    job_event = "io_error",
                    job_id = %job.id(),
                    title,
                    error = %error,
                    "file operation failed"
                );
                if job.resolve(DecisionRequest::error(title, error.to_string()))
                    != DecisionOutcome::Retry
                {
                    return None;
                }
            }
        }
    }
}

fn destination_path(source: &Path, destination_dir: &Path) -> io::Result<PathBuf> {
    let Some(name) = source.file_name() else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source has no file name: {}", source.to_string_lossy()),
        ));
    };
    Ok(destination_dir.join(name))
}

fn copy_contents(source: &Path, destination: &Path, mode: WriteMode) -> io::Result<()> {
    let metadata = fs::symlink_metadata(source)?;
    if metadata.file_type().is_symlink() {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!(
                "symlink copy is not supported: {}",
                source.to_string_lossy()
            ),
        ));
    }

    let mut reader = File::open(source)?;
    let mut writer = match mode {
        WriteMode::Create => OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)?,
        WriteMode::Overwrite => File::create(destination)?,
        WriteMode::Resume => {
            let writer = OpenOptions::new().append(true).open(destination)?;
            let offset = writer.metadata()?.len();
            if offset > metadata.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "destination is larger than source: {}",
                        destination.to_string_lossy()
                    ),
                ));
            }
            reader.seek(SeekFrom::Start(offset))?;
            writer
        }
    };
    io::copy(&mut reader, &mut writer)?;
    drop(writer);

    let modified = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(destination, modified)
}
