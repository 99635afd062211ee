//! Selector generation from a captured element.
//!
//! Strategies in priority order, with their confidence:
//!
//! - **resource-id**: 0.95
//! - **content-desc**: 0.85
//! - **text**: 0.75 (0.72 when longer than the long-text threshold)
//! - **xpath**: 0.70
//! - **bounds**: 0.50
//!
//! The reduced long-text score still sits above xpath, so the ordering above
//! holds for every element.

use crate::a11y::simple_class_name;
use crate::{ElementSelector, ElementSnapshot, SelectorChain, SelectorKind};
use tracing::debug;

pub const LONG_TEXT_CONFIDENCE: f32 = 0.72;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Texts with more characters than this get [`LONG_TEXT_CONFIDENCE`].
    pub long_text_threshold: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            long_text_threshold: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectorGenerator {
    config: GeneratorConfig,
}

impl SelectorGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Primary selector with every other candidate as its fallback chain.
    pub fn generate(&self, element: &ElementSnapshot) -> Option<SelectorChain> {
        let selectors = self.generate_all(element);
        if selectors.is_empty() {
            debug!(?element, "no selector strategy applies to element");
            return None;
        }
        SelectorChain::new(selectors).ok()
    }

    /// Every applicable selector, most reliable first.
    pub fn generate_all(&self, element: &ElementSnapshot) -> Vec<ElementSelector> {
        let mut selectors: Vec<ElementSelector> = [
            self.resource_id(element),
            self.content_desc(element),
            self.text(element),
            self.xpath(element),
            self.bounds(element),
        ]
        .into_iter()
        .flatten()
        .collect();

        selectors.sort_by(|a, b| {
            b.confidence()
                .total_cmp(&a.confidence())
                .then(a.kind().priority().cmp(&b.kind().priority()))
        });
        selectors
    }

    fn resource_id(&self, element: &ElementSnapshot) -> Option<ElementSelector> {
        let id = element.resource_id.as_deref()?;
        ElementSelector::with_default_confidence(SelectorKind::ResourceId, id).ok()
    }

    fn content_desc(&self, element: &ElementSnapshot) -> Option<ElementSelector> {
        let desc = element.content_desc.as_deref()?;
        ElementSelector::with_default_confidence(SelectorKind::ContentDesc, desc).ok()
    }

    fn text(&self, element: &ElementSnapshot) -> Option<ElementSelector> {
        let text = element.text.as_deref()?;
        let confidence = if text.chars().count() > self.config.long_text_threshold {
            LONG_TEXT_CONFIDENCE
        } else {
            SelectorKind::Text.base_confidence()
        };
        ElementSelector::new(SelectorKind::Text, text, confidence).ok()
    }

    fn xpath(&self, element: &ElementSnapshot) -> Option<ElementSelector> {
        let class = simple_class_name(element.class_name.as_deref()?);
        if class.is_empty() {
            return None;
        }
        let predicate = xpath_predicate(element);
        ElementSelector::with_default_confidence(
            SelectorKind::Xpath,
            format!("//{}[{}]", class, predicate),
        )
        .ok()
    }

    fn bounds(&self, element: &ElementSnapshot) -> Option<ElementSelector> {
        let bounds = element.bounds?;
        ElementSelector::with_default_confidence(SelectorKind::Bounds, bounds.to_selector_value())
            .ok()
    }
}

/// Exactly one predicate: text, else content-desc, else a resource-id tail,
/// else the child position. Values containing a quote cannot be expressed
/// in a quoted literal and are skipped.
fn xpath_predicate(element: &ElementSnapshot) -> String {
    let quotable = |v: &Option<String>| v.clone().filter(|s| !s.contains('\''));

    if let Some(text) = quotable(&element.text) {
        return format!("@text='{}'", text);
    }
    if let Some(desc) = quotable(&element.content_desc) {
        return format!("@content-desc='{}'", desc);
    }
    if let Some(id) = quotable(&element.resource_id) {
        let tail = id.rsplit('/').next().unwrap_or(&id);
        if !tail.is_empty() {
            return format!("contains(@resource-id,'{}')", tail);
        }
    }
    format!("position()={}", element.child_index.unwrap_or(0) + 1)
}
