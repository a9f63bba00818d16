use crate::errors::PrintError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Callback run when an element is activated (clicked).
pub type ActivationHandler = Arc<dyn Fn() + Send + Sync>;

/// How many ancestors are reported when a container lookup fails.
const PARENT_CHAIN_LIMIT: usize = 10;

/// Backend-specific element operations. Engines in `platforms` implement this.
pub trait DomElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    fn tag(&self) -> String;
    fn id(&self) -> Option<String>;
    fn set_id(&self, id: &str) -> Result<(), PrintError>;
    fn class_name(&self) -> String;
    fn set_class_name(&self, class: &str) -> Result<(), PrintError>;
    fn attribute(&self, name: &str) -> Option<String>;
    fn set_attribute(&self, name: &str, value: &str) -> Result<(), PrintError>;
    fn set_style(&self, property: &str, value: &str) -> Result<(), PrintError>;
    /// Concatenated text of this element and all of its descendants.
    fn text_content(&self) -> String;
    fn set_text_content(&self, text: &str) -> Result<(), PrintError>;
    fn is_disabled(&self) -> bool;
    fn set_disabled(&self, disabled: bool) -> Result<(), PrintError>;
    fn is_connected(&self) -> bool;
    fn parent(&self) -> Option<DomElement>;
    fn children(&self) -> Vec<DomElement>;
    fn append_child(&self, child: &DomElement) -> Result<(), PrintError>;
    /// Insert `child` before the current first child.
    fn prepend_child(&self, child: &DomElement) -> Result<(), PrintError>;
    /// Detach from the parent, if any.
    fn remove(&self) -> Result<(), PrintError>;
    fn click(&self) -> Result<(), PrintError>;
    fn add_activation_handler(&self, handler: ActivationHandler) -> Result<(), PrintError>;
    fn clone_box(&self) -> Box<dyn DomElementImpl>;
    fn as_any(&self) -> &dyn Any;
}

/// Represents an element in the host document
#[derive(Debug)]
pub struct DomElement {
    inner: Box<dyn DomElementImpl>,
}

impl DomElement {
    pub fn new(inner: Box<dyn DomElementImpl>) -> Self {
        Self { inner }
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    pub fn id(&self) -> Option<String> {
        self.inner.id()
    }

    pub fn set_id(&self, id: &str) -> Result<(), PrintError> {
        self.inner.set_id(id)
    }

    pub fn class_name(&self) -> String {
        self.inner.class_name()
    }

    pub fn set_class_name(&self, class: &str) -> Result<(), PrintError> {
        self.inner.set_class_name(class)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.inner
            .class_name()
            .split_whitespace()
            .any(|c| c == class)
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attribute(name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> Result<(), PrintError> {
        self.inner.set_attribute(name, value)
    }

    pub fn set_style(&self, property: &str, value: &str) -> Result<(), PrintError> {
        self.inner.set_style(property, value)
    }

    pub fn text_content(&self) -> String {
        self.inner.text_content()
    }

    pub fn set_text_content(&self, text: &str) -> Result<(), PrintError> {
        self.inner.set_text_content(text)
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.is_disabled()
    }

    pub fn set_disabled(&self, disabled: bool) -> Result<(), PrintError> {
        self.inner.set_disabled(disabled)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    pub fn parent(&self) -> Option<DomElement> {
        self.inner.parent()
    }

    pub fn children(&self) -> Vec<DomElement> {
        self.inner.children()
    }

    pub fn first_child(&self) -> Option<DomElement> {
        self.inner.children().into_iter().next()
    }

    pub fn append_child(&self, child: &DomElement) -> Result<(), PrintError> {
        self.inner.append_child(child)
    }

    pub fn prepend_child(&self, child: &DomElement) -> Result<(), PrintError> {
        self.inner.prepend_child(child)
    }

    pub fn remove(&self) -> Result<(), PrintError> {
        self.inner.remove()
    }

    /// Backend-specific handle, for engine helpers that need their own type back.
    pub fn as_any(&self) -> &dyn Any {
        self.inner.as_any()
    }

    #[instrument(level = "debug", skip(self), fields(tag = %self.tag()))]
    pub fn click(&self) -> Result<(), PrintError> {
        self.inner.click()
    }

    pub fn on_activate(&self, handler: ActivationHandler) -> Result<(), PrintError> {
        self.inner.add_activation_handler(handler)
    }

    /// Nearest inclusive ancestor carrying `class`.
    pub fn closest_with_class(&self, class: &str) -> Option<DomElement> {
        let mut current = Some(self.clone());
        while let Some(el) = current {
            if el.has_class(class) {
                return Some(el);
            }
            current = el.parent();
        }
        None
    }

    /// `<tag class="...">` descriptions from this element upwards, for diagnostics.
    pub fn parent_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(self.clone());
        while let Some(el) = current {
            if chain.len() >= PARENT_CHAIN_LIMIT {
                break;
            }
            let class = el.class_name();
            if class.is_empty() {
                chain.push(format!("<{}>", el.tag()));
            } else {
                chain.push(format!("<{} class=\"{}\">", el.tag(), class));
            }
            current = el.parent();
        }
        chain
    }
}

impl PartialEq for DomElement {
    fn eq(&self, other: &Self) -> bool {
        self.inner.object_id() == other.inner.object_id()
    }
}

impl Eq for DomElement {}

impl std::hash::Hash for DomElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.object_id().hash(state);
    }
}

impl Clone for DomElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

/// Which of the two host print actions a control represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlKind {
    ShippingLabel,
    PackingSlip,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKind::ShippingLabel => write!(f, "shipping label"),
            ControlKind::PackingSlip => write!(f, "packing slip"),
        }
    }
}

/// A host-owned control resolved for the duration of one capture cycle.
#[derive(Debug, Clone)]
pub struct TriggerControl {
    pub kind: ControlKind,
    pub element: DomElement,
}

impl TriggerControl {
    pub fn new(kind: ControlKind, element: DomElement) -> Self {
        Self { kind, element }
    }

    pub fn activate(&self) -> Result<(), PrintError> {
        debug!(kind = %self.kind, "Activating trigger control");
        self.element
            .click()
            .map_err(|e| PrintError::TriggerFailed(format!("{} control: {e}", self.kind)))
    }
}
