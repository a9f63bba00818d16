//! Timings, phrase lists and markup constants for the combined control.
//!
//! Everything here has a compile-time default. Embedders that need to adjust a
//! value (for example a localized host page) can override it with the `with_*`
//! setters or load a partial JSON document through [`PrintBothConfig::from_json`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::PrintError;

/// Gap between activating the packing slip and the shipping label.
pub const DEFAULT_TRIGGER_DELAY: Duration = Duration::from_millis(1000);
/// Upper bound on one capture cycle, measured from cycle start.
pub const DEFAULT_CAPTURE_DEADLINE: Duration = Duration::from_secs(10);
/// How long Success/Error stay visible before reverting to Idle.
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(2000);
/// Time given to the host page to render a new view after navigation.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

pub const DEFAULT_MARKER_ID: &str = "broomfitters-download-both";
pub const DEFAULT_CONTAINER_CLASS: &str = "Polaris-LegacyStack--vertical";
pub const DEFAULT_ITEM_CLASS: &str = "Polaris-LegacyStack__Item";
pub const DEFAULT_BUTTON_CLASS: &str = "Polaris-Button Polaris-Button--pressable Polaris-Button--variantPrimary Polaris-Button--sizeMedium Polaris-Button--textAlignCenter Polaris-Button--fullWidth";
pub const DEFAULT_LABEL_CLASS: &str = "Polaris-Text--root Polaris-Text--bodySm Polaris-Text--semibold";
pub const DEFAULT_BRAND_COLOR: &str = "#C41E3A";

pub const SHIPPING_LABEL_PHRASES: &[&str] = &["Print 1 shipping label", "Reprint 1 shipping label"];
pub const PACKING_SLIP_PHRASES: &[&str] = &["Print 1 packing slip"];
/// Native buttons plus the host framework's custom button element.
pub const CONTROL_TAGS: &[&str] = &["button", "s-internal-button"];

/// Visible labels of the combined control, one per visual state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ButtonLabels {
    pub idle: String,
    pub busy: String,
    pub success: String,
    pub error: String,
}

impl Default for ButtonLabels {
    fn default() -> Self {
        Self {
            idle: "Print both".to_string(),
            busy: "Downloading...".to_string(),
            success: "Downloaded!".to_string(),
            error: "Error - Try Again".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrintBothConfig {
    pub trigger_delay_ms: u64,
    pub capture_deadline_ms: u64,
    pub reset_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub shipping_label_phrases: Vec<String>,
    pub packing_slip_phrases: Vec<String>,
    pub control_tags: Vec<String>,
    pub container_class: String,
    pub item_class: String,
    pub button_class: String,
    pub label_class: String,
    pub brand_color: String,
    pub marker_id: String,
    pub labels: ButtonLabels,
}

impl Default for PrintBothConfig {
    fn default() -> Self {
        Self {
            trigger_delay_ms: DEFAULT_TRIGGER_DELAY.as_millis() as u64,
            capture_deadline_ms: DEFAULT_CAPTURE_DEADLINE.as_millis() as u64,
            reset_delay_ms: DEFAULT_RESET_DELAY.as_millis() as u64,
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            shipping_label_phrases: to_owned_list(SHIPPING_LABEL_PHRASES),
            packing_slip_phrases: to_owned_list(PACKING_SLIP_PHRASES),
            control_tags: to_owned_list(CONTROL_TAGS),
            container_class: DEFAULT_CONTAINER_CLASS.to_string(),
            item_class: DEFAULT_ITEM_CLASS.to_string(),
            button_class: DEFAULT_BUTTON_CLASS.to_string(),
            label_class: DEFAULT_LABEL_CLASS.to_string(),
            brand_color: DEFAULT_BRAND_COLOR.to_string(),
            marker_id: DEFAULT_MARKER_ID.to_string(),
            labels: ButtonLabels::default(),
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl PrintBothConfig {
    /// Parse a (possibly partial) JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, PrintError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PrintError::InvalidConfig(format!("config parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PrintError> {
        if self.shipping_label_phrases.is_empty() || self.packing_slip_phrases.is_empty() {
            return Err(PrintError::InvalidConfig(
                "phrase lists must not be empty".into(),
            ));
        }
        if self.control_tags.is_empty() {
            return Err(PrintError::InvalidConfig("control_tags must not be empty".into()));
        }
        if self.marker_id.trim().is_empty() {
            return Err(PrintError::InvalidConfig("marker_id must not be empty".into()));
        }
        if self.capture_deadline_ms <= self.trigger_delay_ms {
            return Err(PrintError::InvalidConfig(format!(
                "capture deadline ({}ms) must exceed the trigger delay ({}ms)",
                self.capture_deadline_ms, self.trigger_delay_ms
            )));
        }
        Ok(())
    }

    pub fn trigger_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_delay_ms)
    }

    pub fn capture_deadline(&self) -> Duration {
        Duration::from_millis(self.capture_deadline_ms)
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn with_trigger_delay(mut self, delay: Duration) -> Self {
        self.trigger_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_capture_deadline(mut self, deadline: Duration) -> Self {
        self.capture_deadline_ms = deadline.as_millis() as u64;
        self
    }

    pub fn with_reset_delay(mut self, delay: Duration) -> Self {
        self.reset_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_marker_id(mut self, marker_id: impl Into<String>) -> Self {
        self.marker_id = marker_id.into();
        self
    }

    pub fn with_container_class(mut self, class: impl Into<String>) -> Self {
        self.container_class = class.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_host_wording() {
        let config = PrintBothConfig::default();
        assert_eq!(config.trigger_delay(), Duration::from_millis(1000));
        assert_eq!(config.capture_deadline(), Duration::from_secs(10));
        assert!(config
            .shipping_label_phrases
            .iter()
            .any(|p| p == "Reprint 1 shipping label"));
        assert_eq!(config.labels.idle, "Print both");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            PrintBothConfig::from_json(r#"{"triggerDelayMs": 250, "labels": {"idle": "Both"}}"#)
                .unwrap();
        assert_eq!(config.trigger_delay(), Duration::from_millis(250));
        assert_eq!(config.labels.idle, "Both");
        assert_eq!(config.labels.busy, "Downloading...");
        assert_eq!(config.marker_id, DEFAULT_MARKER_ID);
    }

    #[test]
    fn deadline_must_exceed_trigger_delay() {
        let err = PrintBothConfig::from_json(r#"{"captureDeadlineMs": 500}"#).unwrap_err();
        assert!(matches!(err, PrintError::InvalidConfig(_)));
    }

    #[test]
    fn empty_phrase_list_is_rejected() {
        let mut config = PrintBothConfig::default();
        config.packing_slip_phrases.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn setters_override_defaults() {
        let config = PrintBothConfig::default()
            .with_reset_delay(Duration::from_millis(50))
            .with_settle_delay(Duration::from_millis(20))
            .with_marker_id("print-both-test")
            .with_container_class("Polaris-BlockStack");
        assert_eq!(config.reset_delay(), Duration::from_millis(50));
        assert_eq!(config.settle_delay(), Duration::from_millis(20));
        assert_eq!(config.marker_id, "print-both-test");
        assert_eq!(config.container_class, "Polaris-BlockStack");
        assert!(config.validate().is_ok());
    }
}
