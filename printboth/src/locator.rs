use tracing::{debug, instrument};

use crate::config::PrintBothConfig;
use crate::element::{ControlKind, DomElement, TriggerControl};
use crate::errors::PrintError;
use crate::platforms::DomEngine;
use crate::selector::Selector;
use std::sync::Arc;

/// Both host print controls, resolved together.
#[derive(Debug, Clone)]
pub struct PrintControls {
    pub shipping_label: TriggerControl,
    pub packing_slip: TriggerControl,
}

/// Outcome of one scan of the document. Absence is "not ready yet", not an error.
#[derive(Debug, Clone)]
pub enum LocateResult {
    Found(PrintControls),
    Partial {
        shipping_label: Option<TriggerControl>,
        packing_slip: Option<TriggerControl>,
    },
    NotFound,
}

impl LocateResult {
    pub fn is_found(&self) -> bool {
        matches!(self, LocateResult::Found(_))
    }

    pub fn shipping_label(&self) -> Option<&TriggerControl> {
        match self {
            LocateResult::Found(controls) => Some(&controls.shipping_label),
            LocateResult::Partial { shipping_label, .. } => shipping_label.as_ref(),
            LocateResult::NotFound => None,
        }
    }

    pub fn packing_slip(&self) -> Option<&TriggerControl> {
        match self {
            LocateResult::Found(controls) => Some(&controls.packing_slip),
            LocateResult::Partial { packing_slip, .. } => packing_slip.as_ref(),
            LocateResult::NotFound => None,
        }
    }

    /// Both controls, or `ControlsNotFound` naming what is missing.
    pub fn into_controls(self) -> Result<PrintControls, PrintError> {
        match self {
            LocateResult::Found(controls) => Ok(controls),
            LocateResult::Partial {
                shipping_label,
                packing_slip,
            } => match (shipping_label, packing_slip) {
                (Some(shipping_label), Some(packing_slip)) => Ok(PrintControls {
                    shipping_label,
                    packing_slip,
                }),
                (None, _) => Err(PrintError::ControlsNotFound(format!(
                    "{} control missing",
                    ControlKind::ShippingLabel
                ))),
                (_, None) => Err(PrintError::ControlsNotFound(format!(
                    "{} control missing",
                    ControlKind::PackingSlip
                ))),
            },
            LocateResult::NotFound => Err(PrintError::ControlsNotFound(
                "no print controls on page".into(),
            )),
        }
    }
}

/// Finds the host page's two print controls.
///
/// Every call re-scans the document: the host re-renders its controls freely,
/// so nothing is cached between calls.
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn DomEngine>,
    candidates: Selector,
    shipping_label_phrases: Vec<String>,
    packing_slip_phrases: Vec<String>,
    container_class: String,
}

impl Locator {
    pub fn new(engine: Arc<dyn DomEngine>, config: &PrintBothConfig) -> Self {
        Self {
            engine,
            candidates: Selector::any_tag(&config.control_tags),
            shipping_label_phrases: config.shipping_label_phrases.clone(),
            packing_slip_phrases: config.packing_slip_phrases.clone(),
            container_class: config.container_class.clone(),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn locate(&self) -> LocateResult {
        let candidates = self.engine.find_all(&self.candidates);
        debug!(count = candidates.len(), "Scanned control candidates");

        let shipping_label = first_with_phrase(&candidates, &self.shipping_label_phrases)
            .map(|el| TriggerControl::new(ControlKind::ShippingLabel, el));
        let packing_slip = first_with_phrase(&candidates, &self.packing_slip_phrases)
            .map(|el| TriggerControl::new(ControlKind::PackingSlip, el));

        debug!(
            shipping_label = shipping_label.is_some(),
            packing_slip = packing_slip.is_some(),
            "Locator result"
        );

        match (shipping_label, packing_slip) {
            (Some(shipping_label), Some(packing_slip)) => LocateResult::Found(PrintControls {
                shipping_label,
                packing_slip,
            }),
            (None, None) => LocateResult::NotFound,
            (shipping_label, packing_slip) => LocateResult::Partial {
                shipping_label,
                packing_slip,
            },
        }
    }

    /// The structural ancestor grouping the host's print controls.
    pub fn container_for(&self, control: &TriggerControl) -> Option<DomElement> {
        let container = control.element.closest_with_class(&self.container_class);
        if container.is_none() {
            debug!(
                class = %self.container_class,
                chain = %control.element.parent_chain().join(" → "),
                "Container not found above {} control", control.kind
            );
        }
        container
    }
}

fn first_with_phrase(candidates: &[DomElement], phrases: &[String]) -> Option<DomElement> {
    candidates
        .iter()
        .find(|el| {
            let text = el.text_content();
            phrases.iter().any(|p| text.contains(p.as_str()))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MemoryDocument;

    fn locator_for(doc: &MemoryDocument) -> Locator {
        Locator::new(Arc::new(doc.clone()), &PrintBothConfig::default())
    }

    #[test]
    fn empty_page_reports_not_found_without_mutating() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let before = doc.to_markup();
        let result = locator_for(&doc).locate();
        assert!(matches!(result, LocateResult::NotFound));
        assert_eq!(doc.to_markup(), before);
    }

    #[test]
    fn finds_native_and_custom_buttons() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let label = doc.element("button", "", "Print 1 shipping label").unwrap();
        let slip = doc
            .element("s-internal-button", "", "Print 1 packing slip")
            .unwrap();
        doc.body().append_child(&label).unwrap();
        doc.body().append_child(&slip).unwrap();

        let controls = locator_for(&doc).locate().into_controls().unwrap();
        assert_eq!(controls.shipping_label.element, label);
        assert_eq!(controls.packing_slip.element, slip);
        assert_eq!(controls.packing_slip.kind, ControlKind::PackingSlip);
    }

    #[test]
    fn reprint_wording_is_recognised() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let label = doc.element("button", "", "Reprint 1 shipping label").unwrap();
        doc.body().append_child(&label).unwrap();

        let result = locator_for(&doc).locate();
        assert_eq!(result.shipping_label().map(|c| c.element.clone()), Some(label));
        assert!(result.packing_slip().is_none());
        assert_eq!(
            result.into_controls().unwrap_err(),
            PrintError::ControlsNotFound("packing slip control missing".into())
        );
    }

    #[test]
    fn other_element_shapes_are_ignored() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let div = doc.element("div", "", "Print 1 shipping label").unwrap();
        doc.body().append_child(&div).unwrap();
        assert!(matches!(locator_for(&doc).locate(), LocateResult::NotFound));
    }

    #[test]
    fn first_match_in_document_order_wins() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let first = doc.element("button", "", "Print 1 packing slip").unwrap();
        let second = doc.element("button", "", "Print 1 packing slip").unwrap();
        doc.body().append_child(&first).unwrap();
        doc.body().append_child(&second).unwrap();
        let result = locator_for(&doc).locate();
        assert_eq!(result.packing_slip().map(|c| c.element.clone()), Some(first));
    }

    #[test]
    fn partial_carrying_both_controls_converts() {
        let doc = MemoryDocument::new("https://admin.test/orders/1");
        let label = doc.element("button", "", "Print 1 shipping label").unwrap();
        let slip = doc.element("button", "", "Print 1 packing slip").unwrap();

        let result = LocateResult::Partial {
            shipping_label: Some(TriggerControl::new(ControlKind::ShippingLabel, label.clone())),
            packing_slip: Some(TriggerControl::new(ControlKind::PackingSlip, slip.clone())),
        };
        let controls = result.into_controls().unwrap();
        assert_eq!(controls.shipping_label.element, label);
        assert_eq!(controls.packing_slip.element, slip);

        let missing_label = LocateResult::Partial {
            shipping_label: None,
            packing_slip: None,
        };
        assert_eq!(
            missing_label.into_controls().unwrap_err(),
            PrintError::ControlsNotFound("shipping label control missing".into())
        );
    }
}
