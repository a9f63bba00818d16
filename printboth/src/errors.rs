use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrintError {
    /// Controls or their container are not rendered yet. Drives the watcher's
    /// retry loop and is never shown to the user.
    #[error("Page not ready: {0}")]
    NotReady(String),

    #[error("Print controls not found: {0}")]
    ControlsNotFound(String),

    #[error("Capture timed out with {captured} document(s) captured")]
    CaptureTimeout { captured: usize },

    #[error("Trigger activation failed: {0}")]
    TriggerFailed(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Document operation failed: {0}")]
    Dom(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PrintError {
    /// Whether this failure should be shown through the combined control's
    /// error state. `NotReady` is recovered silently by the watcher.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, PrintError::NotReady(_))
    }
}
