
use std::sync::Arc;

use crate::platforms::{DomEngine, MemoryDocument};
use crate::{ChannelRelay, DomElement, PrintBoth, PrintBothConfig, PrintError};

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_test_writer()
        .try_init();
}

pub struct Fixture {
    pub doc: MemoryDocument,
    pub relay: ChannelRelay,
    pub app: PrintBoth,
}

pub fn fixture() -> Fixture {
    init_tracing();
    let doc = MemoryDocument::new("https://admin.shop.test/store/orders/1001");
    let (relay, _commands) = ChannelRelay::new();
    let shared = Arc::new(relay.clone());
    let app = PrintBoth::new(
        Arc::new(doc.clone()),
        shared.clone(),
        shared,
        PrintBothConfig::default(),
    )
    .expect("default config is valid");
    Fixture { doc, relay, app }
}

/// Vertical stack holding the shipping label item then the packing slip item.
/// Returns the container, attached to the body.
pub fn render_print_block(doc: &MemoryDocument) -> Result<DomElement, PrintError> {
    let container = doc.element("div", "Polaris-LegacyStack Polaris-LegacyStack--vertical", "")?;
    let label_item = doc.element("div", "Polaris-LegacyStack__Item", "")?;
    label_item.append_child(&doc.element("button", "", "Print 1 shipping label")?)?;
    let slip_item = doc.element("div", "Polaris-LegacyStack__Item", "")?;
    slip_item.append_child(&doc.element("button", "", "Print 1 packing slip")?)?;
    container.append_child(&label_item)?;
    container.append_child(&slip_item)?;
    doc.body().append_child(&container)?;
    Ok(container)
}
