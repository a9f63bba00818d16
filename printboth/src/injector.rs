use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, instrument, warn};

use crate::button::ButtonStateMachine;
use crate::capture::CaptureCoordinator;
use crate::config::PrintBothConfig;
use crate::element::DomElement;
use crate::errors::PrintError;
use crate::locator::{LocateResult, Locator};
use crate::platforms::DomEngine;
use crate::relay::DownloadSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    Created,
    AlreadyPresent,
}

/// Owns the single combined control.
pub struct Injector {
    engine: Arc<dyn DomEngine>,
    locator: Locator,
    coordinator: Arc<CaptureCoordinator>,
    downloads: Arc<dyn DownloadSink>,
    config: PrintBothConfig,
    // Also serializes injection attempts coming from different watcher tasks.
    current: Mutex<Option<Arc<ButtonStateMachine>>>,
}

impl Injector {
    pub fn new(
        engine: Arc<dyn DomEngine>,
        locator: Locator,
        coordinator: Arc<CaptureCoordinator>,
        downloads: Arc<dyn DownloadSink>,
        config: PrintBothConfig,
    ) -> Self {
        Self {
            engine,
            locator,
            coordinator,
            downloads,
            config,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<ButtonStateMachine>>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `true` iff a combined control exists once this returns, whether it was
    /// created now or already present. `false` means "try again later".
    pub fn ensure_injected(&self) -> bool {
        match self.try_inject() {
            Ok(_) => true,
            Err(e) if !e.is_user_visible() => {
                debug!(reason = %e, "Combined control not injected yet");
                false
            }
            Err(e) => {
                warn!(error = %e, "Combined control injection failed");
                false
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn try_inject(&self) -> Result<Injection, PrintError> {
        let mut current = self.lock();

        if self.engine.element_by_id(&self.config.marker_id).is_some() {
            return Ok(Injection::AlreadyPresent);
        }

        let controls = match self.locator.locate() {
            LocateResult::Found(controls) => controls,
            _ => return Err(PrintError::NotReady("print controls not rendered".into())),
        };
        let container = self
            .locator
            .container_for(&controls.shipping_label)
            .ok_or_else(|| {
                PrintError::NotReady(format!(
                    "no .{} ancestor above the shipping label control",
                    self.config.container_class
                ))
            })?;

        let (wrapper, button, label) = self.build_control()?;
        let machine = ButtonStateMachine::new(
            button.clone(),
            label,
            self.coordinator.clone(),
            self.downloads.clone(),
            self.config.labels.clone(),
            self.config.reset_delay(),
        );
        // The document owns the handler; the handler must not own the machine.
        let handler = Arc::downgrade(&machine);
        button.on_activate(Arc::new(move || match handler.upgrade() {
            Some(machine) => {
                machine.activate();
            }
            None => debug!("Activation of a released combined control ignored"),
        }))?;

        container.prepend_child(&wrapper)?;
        *current = Some(machine);
        info!(marker = %self.config.marker_id, "Combined control injected");
        Ok(Injection::Created)
    }

    /// The state machine of the control this injector created last.
    pub fn button(&self) -> Option<Arc<ButtonStateMachine>> {
        self.lock().clone()
    }

    /// `<div item><button #marker><span>label</span></button></div>`, detached.
    fn build_control(&self) -> Result<(DomElement, DomElement, DomElement), PrintError> {
        let config = &self.config;

        let wrapper = self.engine.create_element("div");
        wrapper.set_class_name(&config.item_class)?;

        let button = self.engine.create_element("button");
        button.set_id(&config.marker_id)?;
        button.set_class_name(&config.button_class)?;
        button.set_style("background-color", &config.brand_color)?;
        button.set_style("border-color", &config.brand_color)?;
        button.set_attribute("type", "button")?;
        button.set_attribute("aria-disabled", "false")?;

        let label = self.engine.create_element("span");
        label.set_class_name(&config.label_class)?;
        label.set_text_content(&config.labels.idle)?;

        button.append_child(&label)?;
        wrapper.append_child(&button)?;
        Ok((wrapper, button, label))
    }
}
