//! In-process document model.
//!
//! `MemoryDocument` keeps an element tree, the current location and a
//! mutation channel. It is the engine used by the test-suite and by embedders
//! that mirror a live page into the crate.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::element::{ActivationHandler, DomElement, DomElementImpl};
use crate::errors::PrintError;
use crate::platforms::{DomEngine, MutationEvent, MutationKind};
use crate::selector::Selector;

const MUTATION_CHANNEL_CAPACITY: usize = 256;
const BODY: usize = 0;

static NEXT_DOCUMENT_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Default)]
struct Node {
    tag: String,
    id: Option<String>,
    class: String,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    text: String,
    disabled: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    handlers: Vec<ActivationHandler>,
    click_failure: Option<String>,
}

struct Tree {
    nodes: Vec<Node>,
    location: String,
}

impl Tree {
    fn is_connected(&self, mut index: usize) -> bool {
        loop {
            if index == BODY {
                return true;
            }
            match self.nodes[index].parent {
                Some(parent) => index = parent,
                None => return false,
            }
        }
    }

    /// Whether `ancestor` is `index` or one of its ancestors.
    fn contains(&self, ancestor: usize, mut index: usize) -> bool {
        loop {
            if index == ancestor {
                return true;
            }
            match self.nodes[index].parent {
                Some(parent) => index = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, index: usize) -> Option<usize> {
        let parent = self.nodes[index].parent.take()?;
        self.nodes[parent].children.retain(|&c| c != index);
        Some(parent)
    }

    fn preorder(&self, from: usize, out: &mut Vec<usize>) {
        out.push(from);
        for &child in &self.nodes[from].children {
            self.preorder(child, out);
        }
    }

    fn text(&self, index: usize, out: &mut String) {
        out.push_str(&self.nodes[index].text);
        for &child in &self.nodes[index].children {
            self.text(child, out);
        }
    }

    fn markup(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        out.push('<');
        out.push_str(&node.tag);
        if let Some(id) = &node.id {
            out.push_str(&format!(" id=\"{id}\""));
        }
        if !node.class.is_empty() {
            out.push_str(&format!(" class=\"{}\"", node.class));
        }
        for (name, value) in &node.attributes {
            out.push_str(&format!(" {name}=\"{value}\""));
        }
        if node.disabled {
            out.push_str(" disabled");
        }
        out.push('>');
        out.push_str(&node.text);
        for &child in &node.children {
            self.markup(child, out);
        }
        out.push_str(&format!("</{}>", node.tag));
    }
}

struct DocumentState {
    document_id: usize,
    tree: Mutex<Tree>,
    mutations: broadcast::Sender<MutationEvent>,
}

impl DocumentState {
    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn object_id(&self, index: usize) -> usize {
        (self.document_id << 24) | index
    }

    fn notify(&self, kind: MutationKind, index: usize) {
        trace!(?kind, index, "document mutation");
        // No receivers is fine: nobody is observing yet.
        let _ = self.mutations.send(MutationEvent {
            kind,
            target: self.object_id(index),
        });
    }
}

#[derive(Clone)]
struct MemoryElement {
    doc: Arc<DocumentState>,
    index: usize,
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.doc.lock();
        let node = &tree.nodes[self.index];
        f.debug_struct("MemoryElement")
            .field("index", &self.index)
            .field("tag", &node.tag)
            .field("id", &node.id)
            .field("class", &node.class)
            .finish()
    }
}

impl MemoryElement {
    fn wrap(doc: &Arc<DocumentState>, index: usize) -> DomElement {
        DomElement::new(Box::new(MemoryElement {
            doc: doc.clone(),
            index,
        }))
    }

    /// Mutate this node and report the change when it is attached to the document.
    fn update(&self, kind: MutationKind, f: impl FnOnce(&mut Node)) -> Result<(), PrintError> {
        let connected = {
            let mut tree = self.doc.lock();
            f(&mut tree.nodes[self.index]);
            tree.is_connected(self.index)
        };
        if connected {
            self.doc.notify(kind, self.index);
        }
        Ok(())
    }

    fn resolve_child(&self, child: &DomElement) -> Result<usize, PrintError> {
        let other = child
            .as_any()
            .downcast_ref::<MemoryElement>()
            .ok_or_else(|| PrintError::Dom("element belongs to another engine".into()))?;
        if !Arc::ptr_eq(&self.doc, &other.doc) {
            return Err(PrintError::Dom("element belongs to another document".into()));
        }
        Ok(other.index)
    }

    fn insert(&self, child: &DomElement, at_front: bool) -> Result<(), PrintError> {
        let child_index = self.resolve_child(child)?;
        let (old_parent, connected) = {
            let mut tree = self.doc.lock();
            if tree.contains(child_index, self.index) {
                return Err(PrintError::Dom(
                    "cannot insert an element into its own subtree".into(),
                ));
            }
            let old_parent = tree.detach(child_index);
            if at_front {
                tree.nodes[self.index].children.insert(0, child_index);
            } else {
                tree.nodes[self.index].children.push(child_index);
            }
            tree.nodes[child_index].parent = Some(self.index);
            let old_parent = old_parent.filter(|&p| tree.is_connected(p));
            (old_parent, tree.is_connected(self.index))
        };
        if let Some(parent) = old_parent {
            self.doc.notify(MutationKind::ChildList, parent);
        }
        if connected {
            self.doc.notify(MutationKind::ChildList, self.index);
        }
        Ok(())
    }
}

impl DomElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        self.doc.object_id(self.index)
    }

    fn tag(&self) -> String {
        self.doc.lock().nodes[self.index].tag.clone()
    }

    fn id(&self) -> Option<String> {
        self.doc.lock().nodes[self.index].id.clone()
    }

    fn set_id(&self, id: &str) -> Result<(), PrintError> {
        self.update(MutationKind::Attributes, |n| n.id = Some(id.to_string()))
    }

    fn class_name(&self) -> String {
        self.doc.lock().nodes[self.index].class.clone()
    }

    fn set_class_name(&self, class: &str) -> Result<(), PrintError> {
        self.update(MutationKind::Attributes, |n| n.class = class.to_string())
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.doc.lock().nodes[self.index].attributes.get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) -> Result<(), PrintError> {
        self.update(MutationKind::Attributes, |n| {
            n.attributes.insert(name.to_string(), value.to_string());
        })
    }

    fn set_style(&self, property: &str, value: &str) -> Result<(), PrintError> {
        self.update(MutationKind::Attributes, |n| {
            n.style.insert(property.to_string(), value.to_string());
        })
    }

    fn text_content(&self) -> String {
        let tree = self.doc.lock();
        let mut out = String::new();
        tree.text(self.index, &mut out);
        out
    }

    fn set_text_content(&self, text: &str) -> Result<(), PrintError> {
        // Like the DOM setter: replaces every child with a single text run.
        let (detached, connected) = {
            let mut tree = self.doc.lock();
            let children = std::mem::take(&mut tree.nodes[self.index].children);
            for &child in &children {
                tree.nodes[child].parent = None;
            }
            tree.nodes[self.index].text = text.to_string();
            (!children.is_empty(), tree.is_connected(self.index))
        };
        if connected {
            let kind = if detached {
                MutationKind::ChildList
            } else {
                MutationKind::CharacterData
            };
            self.doc.notify(kind, self.index);
        }
        Ok(())
    }

    fn is_disabled(&self) -> bool {
        self.doc.lock().nodes[self.index].disabled
    }

    fn set_disabled(&self, disabled: bool) -> Result<(), PrintError> {
        self.update(MutationKind::Attributes, |n| n.disabled = disabled)
    }

    fn is_connected(&self) -> bool {
        self.doc.lock().is_connected(self.index)
    }

    fn parent(&self) -> Option<DomElement> {
        let parent = self.doc.lock().nodes[self.index].parent;
        parent.map(|p| MemoryElement::wrap(&self.doc, p))
    }

    fn children(&self) -> Vec<DomElement> {
        let children = self.doc.lock().nodes[self.index].children.clone();
        children
            .into_iter()
            .map(|c| MemoryElement::wrap(&self.doc, c))
            .collect()
    }

    fn append_child(&self, child: &DomElement) -> Result<(), PrintError> {
        self.insert(child, false)
    }

    fn prepend_child(&self, child: &DomElement) -> Result<(), PrintError> {
        self.insert(child, true)
    }

    fn remove(&self) -> Result<(), PrintError> {
        if self.index == BODY {
            return Err(PrintError::Dom("cannot remove <body>".into()));
        }
        let parent = {
            let mut tree = self.doc.lock();
            tree.detach(self.index).filter(|&p| tree.is_connected(p))
        };
        if let Some(parent) = parent {
            self.doc.notify(MutationKind::ChildList, parent);
        }
        Ok(())
    }

    fn click(&self) -> Result<(), PrintError> {
        let (handlers, failure, disabled) = {
            let tree = self.doc.lock();
            let node = &tree.nodes[self.index];
            (node.handlers.clone(), node.click_failure.clone(), node.disabled)
        };
        if let Some(message) = failure {
            return Err(PrintError::Dom(message));
        }
        if disabled {
            debug!(index = self.index, "click on disabled element ignored");
            return Ok(());
        }
        // Handlers run without the tree lock so they can mutate the document.
        for handler in handlers {
            handler();
        }
        Ok(())
    }

    fn add_activation_handler(&self, handler: ActivationHandler) -> Result<(), PrintError> {
        self.doc.lock().nodes[self.index].handlers.push(handler);
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn DomElementImpl> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A mutable in-memory document with a `<body>` root.
#[derive(Clone)]
pub struct MemoryDocument {
    state: Arc<DocumentState>,
}

impl fmt::Debug for MemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDocument")
            .field("location", &self.location())
            .finish()
    }
}

impl MemoryDocument {
    pub fn new(location: impl Into<String>) -> Self {
        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        let body = Node {
            tag: "body".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(DocumentState {
                document_id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
                tree: Mutex::new(Tree {
                    nodes: vec![body],
                    location: location.into(),
                }),
                mutations,
            }),
        }
    }

    /// Change the location without touching the tree, like `history.pushState`.
    pub fn navigate(&self, location: impl Into<String>) {
        let location = location.into();
        debug!(%location, "client-side navigation");
        self.state.lock().location = location;
    }

    /// Swap the whole view, as a single-page app does after navigation.
    pub fn replace_body(&self, children: &[DomElement]) -> Result<(), PrintError> {
        let body = self.body();
        for child in body.children() {
            child.remove()?;
        }
        for child in children {
            body.append_child(child)?;
        }
        Ok(())
    }

    /// Create a detached element with a class list and own text.
    pub fn element(&self, tag: &str, class: &str, text: &str) -> Result<DomElement, PrintError> {
        let el = self.create_element(tag);
        if !class.is_empty() {
            el.set_class_name(class)?;
        }
        if !text.is_empty() {
            el.set_text_content(text)?;
        }
        Ok(el)
    }

    /// Make clicks on `element` fail with `message`, or clear the failure.
    pub fn fail_clicks(&self, element: &DomElement, message: Option<&str>) -> Result<(), PrintError> {
        let el = element
            .as_any()
            .downcast_ref::<MemoryElement>()
            .ok_or_else(|| PrintError::Dom("element belongs to another engine".into()))?;
        self.state.lock().nodes[el.index].click_failure = message.map(str::to_string);
        Ok(())
    }

    pub fn count(&self, selector: &Selector) -> usize {
        self.find_all(selector).len()
    }

    /// Serialized view of the connected tree, for logs and assertions.
    pub fn to_markup(&self) -> String {
        let tree = self.state.lock();
        let mut out = String::new();
        tree.markup(BODY, &mut out);
        out
    }

    /// Inline style property of `element`.
    pub fn style(&self, element: &DomElement, property: &str) -> Option<String> {
        let el = element.as_any().downcast_ref::<MemoryElement>()?;
        self.state.lock().nodes[el.index].style.get(property).cloned()
    }
}

impl DomEngine for MemoryDocument {
    fn body(&self) -> DomElement {
        MemoryElement::wrap(&self.state, BODY)
    }

    fn find_all(&self, selector: &Selector) -> Vec<DomElement> {
        let order = {
            let tree = self.state.lock();
            let mut order = Vec::with_capacity(tree.nodes.len());
            tree.preorder(BODY, &mut order);
            order
        };
        order
            .into_iter()
            .map(|index| MemoryElement::wrap(&self.state, index))
            .filter(|el| selector.matches(el))
            .collect()
    }

    fn create_element(&self, tag: &str) -> DomElement {
        let index = {
            let mut tree = self.state.lock();
            tree.nodes.push(Node {
                tag: tag.to_lowercase(),
                ..Default::default()
            });
            tree.nodes.len() - 1
        };
        MemoryElement::wrap(&self.state, index)
    }

    fn location(&self) -> String {
        self.state.lock().location.clone()
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationEvent> {
        self.state.mutations.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_content_includes_descendants() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let button = doc.element("button", "", "").unwrap();
        let span = doc.element("span", "", "Print 1 packing slip").unwrap();
        button.append_child(&span).unwrap();
        assert_eq!(button.text_content(), "Print 1 packing slip");
    }

    #[test]
    fn find_all_only_sees_connected_elements_in_order() {
        let doc = MemoryDocument::new("https://admin.test/");
        let a = doc.element("button", "", "a").unwrap();
        let b = doc.element("button", "", "b").unwrap();
        let detached = doc.element("button", "", "c").unwrap();
        doc.body().append_child(&a).unwrap();
        doc.body().append_child(&b).unwrap();
        let found = doc.find_all(&Selector::Tag("button".into()));
        assert_eq!(found, vec![a, b]);
        assert!(!detached.is_connected());
    }

    #[test]
    fn prepend_keeps_existing_order() {
        let doc = MemoryDocument::new("https://admin.test/");
        let first = doc.element("div", "", "1").unwrap();
        let second = doc.element("div", "", "2").unwrap();
        let front = doc.element("div", "", "0").unwrap();
        doc.body().append_child(&first).unwrap();
        doc.body().append_child(&second).unwrap();
        doc.body().prepend_child(&front).unwrap();
        assert_eq!(doc.body().text_content(), "012");
    }

    #[test]
    fn insert_into_own_subtree_is_rejected() {
        let doc = MemoryDocument::new("https://admin.test/");
        let outer = doc.element("div", "", "").unwrap();
        let inner = doc.element("div", "", "").unwrap();
        outer.append_child(&inner).unwrap();
        assert!(matches!(inner.append_child(&outer), Err(PrintError::Dom(_))));
    }

    #[test]
    fn click_runs_handlers_unless_disabled() {
        let doc = MemoryDocument::new("https://admin.test/");
        let button = doc.element("button", "", "go").unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        button
            .on_activate(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        button.click().unwrap();
        button.set_disabled(true).unwrap();
        button.click().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn click_failure_is_reported() {
        let doc = MemoryDocument::new("https://admin.test/");
        let button = doc.element("button", "", "go").unwrap();
        doc.fail_clicks(&button, Some("boom")).unwrap();
        assert_eq!(button.click(), Err(PrintError::Dom("boom".into())));
    }

    #[tokio::test]
    async fn mutations_are_broadcast_for_connected_changes_only() {
        let doc = MemoryDocument::new("https://admin.test/");
        let mut rx = doc.subscribe_mutations();
        let detached = doc.element("div", "", "x").unwrap();
        detached.set_attribute("role", "group").unwrap();
        assert!(rx.try_recv().is_err());

        doc.body().append_child(&detached).unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, MutationKind::ChildList);
        assert_eq!(event.target, doc.body().object_id());
    }

    #[test]
    fn navigate_changes_location_without_mutation() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let mut rx = doc.subscribe_mutations();
        doc.navigate("https://admin.test/orders/2");
        assert_eq!(doc.location(), "https://admin.test/orders/2");
        assert!(rx.try_recv().is_err());
    }
}
