//! Keeps the combined control present while the host page renders and navigates.
//!
//! Two loops share one [`WatcherState`]:
//! - the injection watch retries injection on every mutation and ends on the
//!   first success;
//! - the navigation watch lives as long as the watcher and restarts
//!   initialization whenever the location changes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::config::PrintBothConfig;
use crate::injector::Injector;
use crate::platforms::{DomEngine, MutationEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionPhase {
    /// Not initialized yet.
    Stopped,
    /// Waiting for the host page to render the print controls.
    Watching,
    /// The combined control exists; mutations are no longer observed.
    Satisfied,
}

/// Process-wide watcher state.
///
/// Initialized by [`DomWatcher::start`], reset on each navigation restart,
/// torn down by [`DomWatcher::stop`].
#[derive(Debug)]
struct WatcherState {
    last_location: String,
    phase: InjectionPhase,
    /// Identifies the current initialization; stale injection watches compare
    /// against it before touching the state.
    epoch: u64,
    injection_watch: Option<JoinHandle<()>>,
    navigation_watch: Option<JoinHandle<()>>,
    restarts: usize,
    stopped: bool,
}

pub struct DomWatcher {
    engine: Arc<dyn DomEngine>,
    injector: Arc<Injector>,
    settle_delay: Duration,
    state: Mutex<WatcherState>,
}

impl DomWatcher {
    pub fn new(
        engine: Arc<dyn DomEngine>,
        injector: Arc<Injector>,
        config: &PrintBothConfig,
    ) -> Arc<Self> {
        let last_location = engine.location();
        Arc::new(Self {
            engine,
            injector,
            settle_delay: config.settle_delay(),
            state: Mutex::new(WatcherState {
                last_location,
                phase: InjectionPhase::Stopped,
                epoch: 0,
                injection_watch: None,
                navigation_watch: None,
                restarts: 0,
                stopped: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WatcherState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> InjectionPhase {
        self.lock().phase
    }

    /// Navigation-triggered restarts so far.
    pub fn restarts(&self) -> usize {
        self.lock().restarts
    }

    pub fn last_location(&self) -> String {
        self.lock().last_location.clone()
    }

    /// Start the navigation watch and run the first initialization.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> InjectionPhase {
        {
            let mut state = self.lock();
            state.stopped = false;
            if state.navigation_watch.is_none() {
                state.last_location = self.engine.location();
                let mutations = self.engine.subscribe_mutations();
                let watcher = Arc::clone(self);
                state.navigation_watch =
                    Some(tokio::spawn(watcher.navigation_watch(mutations)));
            }
        }
        self.initialize()
    }

    /// Disconnect both loops. Pending settle timers become no-ops.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        state.epoch += 1;
        if let Some(handle) = state.injection_watch.take() {
            handle.abort();
        }
        if let Some(handle) = state.navigation_watch.take() {
            handle.abort();
        }
        state.phase = InjectionPhase::Stopped;
        debug!("DOM watcher stopped");
    }

    /// Try to inject right away; if that fails, watch mutations until it succeeds.
    pub fn initialize(self: &Arc<Self>) -> InjectionPhase {
        // Subscribe before the first attempt so a render in between is not missed.
        let mutations = self.engine.subscribe_mutations();
        let epoch = {
            let mut state = self.lock();
            if state.stopped {
                return state.phase;
            }
            state.epoch += 1;
            if let Some(previous) = state.injection_watch.take() {
                previous.abort();
            }
            state.epoch
        };

        let injected = self.injector.ensure_injected();

        let mut state = self.lock();
        if state.epoch != epoch {
            return state.phase;
        }
        if injected {
            info!("Combined control in place");
            state.phase = InjectionPhase::Satisfied;
        } else {
            info!("Print controls not ready, watching for DOM changes");
            state.phase = InjectionPhase::Watching;
            let watcher = Arc::clone(self);
            state.injection_watch = Some(tokio::spawn(watcher.injection_watch(epoch, mutations)));
        }
        state.phase
    }

    async fn injection_watch(
        self: Arc<Self>,
        epoch: u64,
        mut mutations: broadcast::Receiver<MutationEvent>,
    ) {
        loop {
            match mutations.recv().await {
                Ok(event) => trace!(kind = ?event.kind, "Mutation observed while watching"),
                Err(RecvError::Lagged(skipped)) => {
                    trace!(skipped, "Mutation receiver lagged");
                }
                Err(RecvError::Closed) => return,
            }
            if self.lock().epoch != epoch {
                return;
            }
            if self.injector.ensure_injected() {
                let mut state = self.lock();
                if state.epoch == epoch {
                    state.phase = InjectionPhase::Satisfied;
                    state.injection_watch = None;
                    info!("Combined control injected after DOM change");
                }
                return;
            }
        }
    }

    async fn navigation_watch(self: Arc<Self>, mut mutations: broadcast::Receiver<MutationEvent>) {
        loop {
            match mutations.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => self.check_location(),
                Err(RecvError::Closed) => return,
            }
        }
    }

    fn check_location(self: &Arc<Self>) {
        let current = self.engine.location();
        {
            let mut state = self.lock();
            if current == state.last_location {
                return;
            }
            state.last_location = current.clone();
            state.restarts += 1;
        }
        info!(url = %current, "Location changed, re-initializing");

        let watcher = Arc::clone(self);
        let delay = self.settle_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            watcher.initialize();
        });
    }
}
