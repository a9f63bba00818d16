//! "Print both" for fulfillment pages
//!
//! Finds the host page's "print shipping label" and "print packing slip"
//! controls, injects one combined control next to them, and on activation
//! triggers both, collects the two document locations reported back by the
//! relay and hands them to the download collaborator.

use std::sync::Arc;

use tracing::{info, instrument};

pub mod button;
pub mod capture;
pub mod config;
pub mod element;
pub mod errors;
pub mod extension_bridge;
pub mod injector;
pub mod locator;
pub mod logging;
pub mod platforms;
pub mod relay;
pub mod selector;
#[cfg(test)]
mod tests;
pub mod watcher;

pub use button::{ButtonStateMachine, ButtonVisualState};
pub use capture::{CaptureCoordinator, CaptureSession};
pub use config::PrintBothConfig;
pub use element::{ControlKind, DomElement, TriggerControl};
pub use errors::PrintError;
pub use extension_bridge::RelayBridge;
pub use injector::Injector;
pub use locator::{LocateResult, Locator, PrintControls};
pub use platforms::{DomEngine, MemoryDocument};
pub use relay::{ChannelRelay, DownloadSink, Relay, RelayCommand, RelayNotification};
pub use selector::Selector;
pub use watcher::{DomWatcher, InjectionPhase};

/// The main entry point: wires locator, coordinator, injector and watcher
/// around one document.
pub struct PrintBoth {
    config: PrintBothConfig,
    locator: Locator,
    coordinator: Arc<CaptureCoordinator>,
    injector: Arc<Injector>,
    watcher: Arc<DomWatcher>,
}

impl PrintBoth {
    pub fn new(
        engine: Arc<dyn DomEngine>,
        relay: Arc<dyn Relay>,
        downloads: Arc<dyn DownloadSink>,
        config: PrintBothConfig,
    ) -> Result<Self, PrintError> {
        config.validate()?;
        let locator = Locator::new(engine.clone(), &config);
        let coordinator = Arc::new(CaptureCoordinator::new(locator.clone(), relay, &config));
        let injector = Arc::new(Injector::new(
            engine.clone(),
            locator.clone(),
            coordinator.clone(),
            downloads,
            config.clone(),
        ));
        let watcher = DomWatcher::new(engine, injector.clone(), &config);
        Ok(Self {
            config,
            locator,
            coordinator,
            injector,
            watcher,
        })
    }

    /// Use the process-wide WebSocket bridge as both relay and download sink.
    pub async fn with_relay_bridge(
        engine: Arc<dyn DomEngine>,
        config: PrintBothConfig,
    ) -> Result<Self, PrintError> {
        let bridge = RelayBridge::global().await?;
        Self::new(engine, bridge.clone(), bridge, config)
    }

    /// Begin watching the document. Must be called from within a tokio runtime.
    #[instrument(skip(self))]
    pub fn start(&self) -> InjectionPhase {
        let phase = self.watcher.start();
        info!(?phase, "Print both started");
        phase
    }

    pub fn stop(&self) {
        self.watcher.stop();
    }

    pub fn config(&self) -> &PrintBothConfig {
        &self.config
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn coordinator(&self) -> Arc<CaptureCoordinator> {
        self.coordinator.clone()
    }

    pub fn injector(&self) -> Arc<Injector> {
        self.injector.clone()
    }

    pub fn watcher(&self) -> Arc<DomWatcher> {
        self.watcher.clone()
    }

    /// State machine of the injected control, once there is one.
    pub fn button(&self) -> Option<Arc<ButtonStateMachine>> {
        self.injector.button()
    }
}
