use std::fmt;
use std::io;

use crate::JobId;

#[derive(Debug)]
pub enum JobError {
    Spawn { job_id: JobId, source: io::Error },
    WorkerPanicked { job_id: JobId },
}

impl fmt::Display for JobError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { job_id, source } => {
                write!(formatter, "failed to spawn worker for job #{job_id}: {source}")
            }
            Self::WorkerPanicked { job_id } => {
                write!(formatter, "worker for job #{job_id} panicked")
            }
        }
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::WorkerPanicked { .. } => None,
        }
    }
}
