//! Analyzer options.
//!
//! Every field has a default so callers may pass a partial JSON object (or none
//! at all) from the wasm layer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerOptions {
    /// Base class a flow must extend, e.g. `class X extends BubbleFlow<'webhook/http'>`.
    pub flow_base_class: String,
    /// Type whose indexed access (`Registry['slack/bot_mentioned']`) names a trigger event payload.
    pub trigger_registry_type: String,
    /// Module specifier bubble classes are imported from.
    pub bubble_package: String,
    /// Column slack when matching a statement against a located bubble.
    pub location_tolerance: usize,
    /// Expand `this.method()` call sites into the callee body.
    pub expand_method_calls: bool,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            flow_base_class: "BubbleFlow".into(),
            trigger_registry_type: "BubbleTriggerEventRegistry".into(),
            bubble_package: "@bubblelab/bubble-core".into(),
            location_tolerance: 8,
            expand_method_calls: true,
        }
    }
}

impl AnalyzerOptions {
    /// Parse options from JSON; an empty string yields the defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }
}
