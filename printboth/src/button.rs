use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::capture::CaptureCoordinator;
use crate::config::ButtonLabels;
use crate::element::DomElement;
use crate::errors::PrintError;
use crate::relay::DownloadSink;

/// What the combined control currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ButtonVisualState {
    Idle,
    Busy,
    Success,
    Error,
}

#[derive(Debug)]
struct MachineState {
    visual: ButtonVisualState,
    /// Bumped on every accepted activation; a reset timer only applies to the
    /// cycle that armed it.
    generation: u64,
    last_error: Option<PrintError>,
}

/// Drives one combined control: Idle → Busy → Success|Error → Idle.
///
/// This is the only caller of [`CaptureCoordinator::run_cycle`], and Busy
/// rejects activation, so at most one capture cycle runs at a time.
pub struct ButtonStateMachine {
    button: DomElement,
    label: DomElement,
    coordinator: Arc<CaptureCoordinator>,
    downloads: Arc<dyn DownloadSink>,
    labels: ButtonLabels,
    reset_delay: Duration,
    state: Mutex<MachineState>,
    cycles_started: AtomicUsize,
}

impl ButtonStateMachine {
    pub fn new(
        button: DomElement,
        label: DomElement,
        coordinator: Arc<CaptureCoordinator>,
        downloads: Arc<dyn DownloadSink>,
        labels: ButtonLabels,
        reset_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            button,
            label,
            coordinator,
            downloads,
            labels,
            reset_delay,
            state: Mutex::new(MachineState {
                visual: ButtonVisualState::Idle,
                generation: 0,
                last_error: None,
            }),
            cycles_started: AtomicUsize::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ButtonVisualState {
        self.lock().visual
    }

    pub fn last_error(&self) -> Option<PrintError> {
        self.lock().last_error.clone()
    }

    pub fn cycles_started(&self) -> usize {
        self.cycles_started.load(Ordering::SeqCst)
    }

    pub fn button(&self) -> &DomElement {
        &self.button
    }

    /// Handle a user activation. Returns `false` when it was rejected.
    ///
    /// Must be called from within a tokio runtime; the cycle runs on a spawned task.
    pub fn activate(self: &Arc<Self>) -> bool {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Activation outside of a runtime, ignoring");
                return false;
            }
        };

        let generation = {
            let mut state = self.lock();
            if state.visual == ButtonVisualState::Busy {
                debug!("Activation rejected: capture already in progress");
                return false;
            }
            state.visual = ButtonVisualState::Busy;
            state.generation += 1;
            state.last_error = None;
            state.generation
        };
        self.cycles_started.fetch_add(1, Ordering::SeqCst);
        self.render(ButtonVisualState::Busy);
        info!(generation, "Print both activated");

        let machine = Arc::clone(self);
        handle.spawn(async move { machine.run(generation).await });
        true
    }

    async fn run(self: Arc<Self>, generation: u64) {
        let result = self.cycle().await;
        let next = match &result {
            Ok(count) => {
                info!(documents = count, "Print both finished");
                ButtonVisualState::Success
            }
            Err(e) => {
                error!(error = %e, "Print both failed");
                ButtonVisualState::Error
            }
        };
        {
            let mut state = self.lock();
            state.visual = next;
            state.last_error = result.err();
        }
        self.render(next);

        tokio::time::sleep(self.reset_delay).await;
        {
            let mut state = self.lock();
            if state.generation != generation || state.visual == ButtonVisualState::Busy {
                return;
            }
            state.visual = ButtonVisualState::Idle;
        }
        self.render(ButtonVisualState::Idle);
    }

    /// Run one capture and hand the result to the download collaborator.
    async fn cycle(&self) -> Result<usize, PrintError> {
        let locations = self.coordinator.run_cycle().await?;
        let captured = locations.len();
        self.downloads.download_documents(locations).await?;
        if captured == 0 {
            return Err(PrintError::CaptureTimeout { captured });
        }
        Ok(captured)
    }

    fn render(&self, state: ButtonVisualState) {
        let text = match state {
            ButtonVisualState::Idle => &self.labels.idle,
            ButtonVisualState::Busy => &self.labels.busy,
            ButtonVisualState::Success => &self.labels.success,
            ButtonVisualState::Error => &self.labels.error,
        };
        let busy = state == ButtonVisualState::Busy;
        let result = self
            .label
            .set_text_content(text)
            .and_then(|_| self.button.set_disabled(busy))
            .and_then(|_| {
                self.button
                    .set_attribute("aria-disabled", if busy { "true" } else { "false" })
            });
        if let Err(e) = result {
            warn!(error = %e, ?state, "Failed to render combined control");
        }
    }
}
