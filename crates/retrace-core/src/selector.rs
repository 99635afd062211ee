use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy used to re-identify an element on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    ResourceId,
    ContentDesc,
    Text,
    Xpath,
    Bounds,
}

impl SelectorKind {
    /// All strategies, most reliable first.
    pub const PRIORITY: [SelectorKind; 5] = [
        SelectorKind::ResourceId,
        SelectorKind::ContentDesc,
        SelectorKind::Text,
        SelectorKind::Xpath,
        SelectorKind::Bounds,
    ];

    /// Position in [`SelectorKind::PRIORITY`]; lower is more reliable.
    pub fn priority(self) -> usize {
        match self {
            SelectorKind::ResourceId => 0,
            SelectorKind::ContentDesc => 1,
            SelectorKind::Text => 2,
            SelectorKind::Xpath => 3,
            SelectorKind::Bounds => 4,
        }
    }

    pub fn base_confidence(self) -> f32 {
        match self {
            SelectorKind::ResourceId => 0.95,
            SelectorKind::ContentDesc => 0.85,
            SelectorKind::Text => 0.75,
            SelectorKind::Xpath => 0.70,
            SelectorKind::Bounds => 0.50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SelectorKind::ResourceId => "resource_id",
            SelectorKind::ContentDesc => "content_desc",
            SelectorKind::Text => "text",
            SelectorKind::Xpath => "xpath",
            SelectorKind::Bounds => "bounds",
        }
    }
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single strategy + value pair. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSelector {
    kind: SelectorKind,
    value: String,
    confidence: f32,
}

impl ElementSelector {
    pub fn new(
        kind: SelectorKind,
        value: impl Into<String>,
        confidence: f32,
    ) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::EmptySelectorValue(kind));
        }
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence));
        }
        Ok(Self {
            kind,
            value,
            confidence,
        })
    }

    /// Build a selector with the strategy's default confidence.
    pub fn with_default_confidence(
        kind: SelectorKind,
        value: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Self::new(kind, value, kind.base_confidence())
    }

    pub fn kind(&self) -> SelectorKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

impl fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}=\"{}\" ({:.2})",
            self.kind, self.value, self.confidence
        )
    }
}

/// An ordered, non-empty list of selectors tried from first to last.
///
/// On the wire a chain is the nested `{type, value, confidence, fallback}`
/// record produced by recorders; in memory it is a flat vector, so a chain
/// can never contain a cycle or share a fallback with another chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSelector", into = "RawSelector")]
pub struct SelectorChain {
    selectors: Vec<ElementSelector>,
}

impl SelectorChain {
    pub fn new(selectors: Vec<ElementSelector>) -> Result<Self, ValidationError> {
        if selectors.is_empty() {
            return Err(ValidationError::EmptyChain);
        }
        Ok(Self { selectors })
    }

    pub fn single(selector: ElementSelector) -> Self {
        Self {
            selectors: vec![selector],
        }
    }

    pub fn primary(&self) -> &ElementSelector {
        &self.selectors[0]
    }

    /// Selectors after the primary one, in the order they are tried.
    pub fn fallbacks(&self) -> &[ElementSelector] {
        &self.selectors[1..]
    }

    pub fn selectors(&self) -> &[ElementSelector] {
        &self.selectors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElementSelector> {
        self.selectors.iter()
    }

    /// First selector of the given kind, with its position in the chain.
    pub fn find_kind(&self, kind: SelectorKind) -> Option<(usize, &ElementSelector)> {
        self.selectors
            .iter()
            .enumerate()
            .find(|(_, s)| s.kind == kind)
    }

    pub fn into_vec(self) -> Vec<ElementSelector> {
        self.selectors
    }
}

impl<'a> IntoIterator for &'a SelectorChain {
    type Item = &'a ElementSelector;
    type IntoIter = std::slice::Iter<'a, ElementSelector>;

    fn into_iter(self) -> Self::IntoIter {
        self.selectors.iter()
    }
}

impl fmt::Display for SelectorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, selector) in self.selectors.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", selector)?;
        }
        Ok(())
    }
}

/// Wire shape of a selector with its nested fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RawSelector {
    #[serde(rename = "type")]
    kind: SelectorKind,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback: Option<Box<RawSelector>>,
}

impl TryFrom<RawSelector> for SelectorChain {
    type Error = ValidationError;

    fn try_from(raw: RawSelector) -> Result<Self, Self::Error> {
        let mut selectors = Vec::new();
        let mut next = Some(Box::new(raw));
        while let Some(node) = next {
            let RawSelector {
                kind,
                value,
                confidence,
                fallback,
            } = *node;
            let confidence = confidence.unwrap_or_else(|| kind.base_confidence());
            selectors.push(ElementSelector::new(kind, value, confidence)?);
            next = fallback;
        }
        SelectorChain::new(selectors)
    }
}

impl From<SelectorChain> for RawSelector {
    /// Folds from the least reliable selector upwards so that each record
    /// owns the one tried after it.
    fn from(chain: SelectorChain) -> Self {
        let mut folded: Option<Box<RawSelector>> = None;
        for selector in chain.selectors.into_iter().rev() {
            folded = Some(Box::new(RawSelector {
                kind: selector.kind,
                value: selector.value,
                confidence: Some(selector.confidence),
                fallback: folded,
            }));
        }
        match folded {
            Some(raw) => *raw,
            // SelectorChain is never empty.
            None => unreachable!("selector chain without selectors"),
        }
    }
}
