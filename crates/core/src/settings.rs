use std::time::Duration;

use crate::DEFAULT_DECISION_POLL_INTERVAL;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobSettings {
    pub auto_unmark: bool,
    pub auto_skip_errors: bool,
    pub notify_on_completion: bool,
    pub notify_on_error: bool,
    pub pause_folder_monitoring: bool,
    pub decision_poll_interval_ms: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            auto_unmark: true,
            auto_skip_errors: false,
            notify_on_completion: true,
            notify_on_error: true,
            pause_folder_monitoring: true,
            decision_poll_interval_ms: DEFAULT_DECISION_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl JobSettings {
    pub fn decision_poll_interval(&self) -> Duration {
        Duration::from_millis(self.decision_poll_interval_ms.max(1))
    }
}
