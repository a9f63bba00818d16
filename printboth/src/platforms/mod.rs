use crate::element::DomElement;
use crate::selector::Selector;
use tokio::sync::broadcast;

pub mod memory;

pub use memory::MemoryDocument;

/// What changed in the document. Watchers only care that *something* changed,
/// the kind is carried for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes,
    CharacterData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub kind: MutationKind,
    /// Object id of the element whose subtree changed.
    pub target: usize,
}

/// Access to a live host document.
///
/// Mutation notifications are delivered asynchronously through a broadcast
/// channel, never synchronously with the change that caused them.
pub trait DomEngine: Send + Sync {
    /// Root of the observed subtree (`<body>`).
    fn body(&self) -> DomElement;

    /// All connected elements matching `selector`, in document order.
    fn find_all(&self, selector: &Selector) -> Vec<DomElement>;

    fn element_by_id(&self, id: &str) -> Option<DomElement> {
        self.find_all(&Selector::Id(id.to_string())).into_iter().next()
    }

    /// Create a detached element owned by this document.
    fn create_element(&self, tag: &str) -> DomElement;

    /// Current page location (full URL).
    fn location(&self) -> String;

    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationEvent>;
}
