use crate::FileRef;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Panel {
    Active,
    Inactive,
}

/// What a finished job asks the panels to reload.
#[derive(Clone, Debug, Default)]
pub struct RefreshRequest {
    pub active_changed: bool,
    pub inactive_changed: bool,
    /// Only set when the file still exists inside the active folder.
    pub select: Option<FileRef>,
}

impl RefreshRequest {
    pub fn is_empty(&self) -> bool {
        !self.active_changed && !self.inactive_changed
    }
}

/// The file panels a job was started from.
pub trait PanelView: Send + Sync {
    fn current_folder(&self, panel: Panel) -> Option<FileRef>;

    /// Clears the mark of a successfully processed top-level file.
    fn unmark(&self, file: &FileRef);

    /// Called once after the worker loop ends, whatever the outcome.
    fn refresh(&self, request: &RefreshRequest);

    /// Folder change monitoring is paused while a job may be rewriting the
    /// folders on display.
    fn set_monitoring_paused(&self, _paused: bool) {}
}

/// A view with no panels, for jobs started without a UI.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedView;

impl PanelView for DetachedView {
    fn current_folder(&self, _panel: Panel) -> Option<FileRef> {
        None
    }

    fn unmark(&self, _file: &FileRef) {}

    fn refresh(&self, _request: &RefreshRequest) {}
}
