#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AlertKind {
    JobError,
    JobCompleted,
}

impl AlertKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::JobError => "job_error",
            Self::JobCompleted => "job_completed",
        }
    }
}

/// Best-effort background notifications. Implementations must not block the
/// caller, which is usually the job's worker.
pub trait AlertSink: Send + Sync {
    fn notify(&self, kind: AlertKind, title: &str, message: &str);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAlerts;

impl AlertSink for TracingAlerts {
    fn notify(&self, kind: AlertKind, title: &str, message: &str) {
        match kind {
            AlertKind::JobError => {
                tracing::warn!(alert = kind.label(), title, message, "job alert");
            }
            AlertKind::JobCompleted => {
                tracing::info!(alert = kind.label(), title, message, "job alert");
            }
        }
    }
}
