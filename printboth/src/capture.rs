//! One "trigger both, collect both" cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::PrintBothConfig;
use crate::errors::PrintError;
use crate::locator::{Locator, PrintControls};
use crate::relay::{Relay, RelayCommand, RelayListener, RelayNotification};

/// A cycle completes as soon as this many locations have been captured.
pub const EXPECTED_DOCUMENTS: usize = 2;

/// Ephemeral state of one capture cycle.
#[derive(Debug)]
pub struct CaptureSession {
    id: String,
    locations: Vec<String>,
    deadline: Instant,
}

impl CaptureSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            locations: Vec::with_capacity(EXPECTED_DOCUMENTS),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn is_complete(&self) -> bool {
        self.locations.len() >= EXPECTED_DOCUMENTS
    }

    /// Append a notification's location. Notifications tagged for another
    /// session are stale and dropped; duplicates are kept.
    pub fn accept(&mut self, notification: RelayNotification) -> bool {
        match notification {
            RelayNotification::CapturedLocation { url, session_id } => {
                if let Some(tag) = session_id.as_deref() {
                    if tag != self.id {
                        debug!(session = %self.id, stale = %tag, %url, "Dropping notification for another session");
                        return false;
                    }
                }
                if self.is_complete() {
                    return false;
                }
                info!(session = %self.id, %url, index = self.locations.len(), "Captured document location");
                self.locations.push(url);
                true
            }
        }
    }

    pub fn into_locations(self) -> Vec<String> {
        self.locations
    }
}

pub struct CaptureCoordinator {
    locator: Locator,
    relay: Arc<dyn Relay>,
    trigger_delay: Duration,
    deadline: Duration,
}

impl CaptureCoordinator {
    pub fn new(locator: Locator, relay: Arc<dyn Relay>, config: &PrintBothConfig) -> Self {
        Self {
            locator,
            relay,
            trigger_delay: config.trigger_delay(),
            deadline: config.capture_deadline(),
        }
    }

    /// Trigger both host controls and collect up to two document locations.
    ///
    /// Resolves with whatever was captured when the deadline passes, which may
    /// be fewer than two or none at all. Fails when the controls are gone or a
    /// trigger activation fails.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<Vec<String>, PrintError> {
        let controls = self.locator.locate().into_controls()?;

        let mut session = CaptureSession::new(self.deadline);
        // Registered before anything is triggered so no early notification is lost.
        let mut listener = self.relay.listen();
        info!(session = %session.id(), "Starting capture cycle");

        let outcome = match self
            .relay
            .send(RelayCommand::StartCapture {
                session_id: session.id().to_string(),
            })
            .await
        {
            Ok(()) => {
                self.trigger_and_collect(&controls, &mut session, &mut listener)
                    .await
            }
            Err(e) => Err(e),
        };

        listener.close();
        if let Err(e) = self
            .relay
            .send(RelayCommand::StopCapture {
                session_id: session.id().to_string(),
            })
            .await
        {
            warn!(session = %session.id(), error = %e, "Failed to stop relay capture");
        }

        outcome?;
        let locations = session.into_locations();
        info!(captured = locations.len(), "Capture cycle finished");
        Ok(locations)
    }

    async fn trigger_and_collect(
        &self,
        controls: &PrintControls,
        session: &mut CaptureSession,
        listener: &mut RelayListener,
    ) -> Result<(), PrintError> {
        let deadline = session.deadline();
        let triggers = self.fire(controls);
        tokio::pin!(triggers);

        let mut fired = false;
        let mut relay_open = true;
        loop {
            tokio::select! {
                result = &mut triggers, if !fired => {
                    result?;
                    fired = true;
                    if session.is_complete() {
                        return Ok(());
                    }
                }
                notification = listener.recv(), if relay_open && !session.is_complete() => match notification {
                    Some(notification) => {
                        session.accept(notification);
                        // Both controls are always activated before the cycle resolves.
                        if session.is_complete() && fired {
                            return Ok(());
                        }
                    }
                    None => {
                        warn!(session = %session.id(), "Relay channel closed during capture");
                        relay_open = false;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    let timeout = PrintError::CaptureTimeout {
                        captured: session.locations().len(),
                    };
                    warn!(session = %session.id(), "{timeout}");
                    return Ok(());
                }
            }
        }
    }

    /// Packing slip first, then the shipping label after the trigger delay.
    async fn fire(&self, controls: &PrintControls) -> Result<(), PrintError> {
        controls.packing_slip.activate()?;
        tokio::time::sleep(self.trigger_delay).await;
        controls.shipping_label.activate()?;
        Ok(())
    }
}
