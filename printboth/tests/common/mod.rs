#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use printboth::{
    ChannelRelay, ControlKind, DomElement, DomEngine, MemoryDocument, PrintBoth, PrintBothConfig,
    PrintError, RelayCommand,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const ORDER_URL: &str = "https://admin.shop.test/store/orders/1001";
pub const NEXT_ORDER_URL: &str = "https://admin.shop.test/store/orders/1002";
pub const SLIP_PDF: &str = "https://cdn/a.pdf";
pub const LABEL_PDF: &str = "https://cdn/b.pdf";

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The host page's print block: a vertical stack with one item per control.
pub struct FulfillmentView {
    pub container: DomElement,
    pub shipping_label: DomElement,
    pub packing_slip: DomElement,
}

pub fn build_view(doc: &MemoryDocument) -> Result<FulfillmentView, PrintError> {
    let container = doc.element("div", "Polaris-LegacyStack Polaris-LegacyStack--vertical", "")?;

    let label_item = doc.element("div", "Polaris-LegacyStack__Item", "")?;
    let shipping_label = doc.element("button", "Polaris-Button", "")?;
    shipping_label.append_child(&doc.element("span", "", "Print 1 shipping label")?)?;
    label_item.append_child(&shipping_label)?;

    let slip_item = doc.element("div", "Polaris-LegacyStack__Item", "")?;
    let packing_slip = doc.element("s-internal-button", "", "Print 1 packing slip")?;
    slip_item.append_child(&packing_slip)?;

    container.append_child(&label_item)?;
    container.append_child(&slip_item)?;
    Ok(FulfillmentView {
        container,
        shipping_label,
        packing_slip,
    })
}

pub fn render_view(doc: &MemoryDocument) -> Result<FulfillmentView, PrintError> {
    let view = build_view(doc)?;
    doc.body().append_child(&view.container)?;
    Ok(view)
}

/// Activation timestamps of the host controls, in click order.
pub type ClickLog = Arc<Mutex<Vec<(ControlKind, Instant)>>>;

/// Make the host controls behave like the real page: each click records a
/// timestamp and, when `url` is given, the relay reports a new document.
pub fn wire_control(
    element: &DomElement,
    kind: ControlKind,
    relay: &ChannelRelay,
    url: Option<&str>,
    log: &ClickLog,
) -> Result<(), PrintError> {
    let relay = relay.clone();
    let url = url.map(str::to_string);
    let log = log.clone();
    element.on_activate(Arc::new(move || {
        log.lock().unwrap().push((kind, Instant::now()));
        if let Some(url) = &url {
            relay.notify(url.clone());
        }
    }))
}

pub struct Harness {
    pub doc: MemoryDocument,
    pub relay: ChannelRelay,
    pub commands: mpsc::UnboundedReceiver<RelayCommand>,
    pub app: PrintBoth,
    pub clicks: ClickLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PrintBothConfig::default())
    }

    pub fn with_config(config: PrintBothConfig) -> Self {
        init_tracing();
        let doc = MemoryDocument::new(ORDER_URL);
        let (relay, commands) = ChannelRelay::new();
        let relay_arc = Arc::new(relay.clone());
        let app = PrintBoth::new(
            Arc::new(doc.clone()),
            relay_arc.clone(),
            relay_arc,
            config,
        )
        .expect("valid config");
        Self {
            doc,
            relay,
            commands,
            app,
            clicks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Render the print block with both controls reporting a document.
    pub fn render_printing_view(&self) -> FulfillmentView {
        let view = render_view(&self.doc).expect("render view");
        self.wire(&view, Some(SLIP_PDF), Some(LABEL_PDF));
        view
    }

    pub fn wire(&self, view: &FulfillmentView, slip_url: Option<&str>, label_url: Option<&str>) {
        wire_control(
            &view.packing_slip,
            ControlKind::PackingSlip,
            &self.relay,
            slip_url,
            &self.clicks,
        )
        .expect("wire packing slip");
        wire_control(
            &view.shipping_label,
            ControlKind::ShippingLabel,
            &self.relay,
            label_url,
            &self.clicks,
        )
        .expect("wire shipping label");
    }

    pub fn combined_controls(&self) -> usize {
        let marker = &self.app.config().marker_id;
        self.doc.count(&printboth::Selector::Id(marker.clone()))
    }

    pub fn combined_button(&self) -> DomElement {
        self.doc
            .element_by_id(&self.app.config().marker_id)
            .expect("combined control present")
    }

    pub fn drain_commands(&mut self) -> Vec<RelayCommand> {
        let mut out = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            out.push(command);
        }
        out
    }
}
