use crate::a11y::{self, AccessibilityNode, Bounds};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const RESOURCE_ID_KEYS: &[&str] = &["resourceId", "resource-id", "resource_id", "id"];
const CONTENT_DESC_KEYS: &[&str] = &[
    "contentDescription",
    "content-desc",
    "content_desc",
    "contentDesc",
    "description",
];
const TEXT_KEYS: &[&str] = &["text"];
const CLASS_KEYS: &[&str] = &["className", "class", "class_name"];
const BOUNDS_KEYS: &[&str] = &["bounds", "boundsInScreen"];
const INDEX_KEYS: &[&str] = &["index", "childIndex", "child_index"];

/// Normalized attributes of a captured UI element.
///
/// Blank strings are stored as `None`; non-blank values are kept verbatim so
/// exact-match selectors built from them still match the live node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementSnapshot {
    pub resource_id: Option<String>,
    pub content_desc: Option<String>,
    pub text: Option<String>,
    pub class_name: Option<String>,
    pub bounds: Option<Bounds>,
    pub child_index: Option<usize>,
}

impl ElementSnapshot {
    /// Build from a loose attribute map. Each attribute takes the first alias
    /// holding a non-empty value.
    pub fn from_attributes(attrs: &Map<String, Value>) -> Self {
        Self {
            resource_id: first_string(attrs, RESOURCE_ID_KEYS),
            content_desc: first_string(attrs, CONTENT_DESC_KEYS),
            text: first_string(attrs, TEXT_KEYS),
            class_name: first_string(attrs, CLASS_KEYS),
            bounds: BOUNDS_KEYS
                .iter()
                .filter_map(|k| attrs.get(*k))
                .filter_map(a11y::bounds_from_value)
                .find_map(|s| Bounds::parse(&s)),
            child_index: INDEX_KEYS
                .iter()
                .filter_map(|k| attrs.get(*k))
                .find_map(as_index),
        }
    }

    /// Same as [`ElementSnapshot::from_attributes`]; non-object values yield an
    /// empty snapshot.
    pub fn from_value(value: &Value) -> Self {
        match value.as_object() {
            Some(map) => Self::from_attributes(map),
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resource_id.is_none()
            && self.content_desc.is_none()
            && self.text.is_none()
            && self.class_name.is_none()
            && self.bounds.is_none()
    }
}

impl From<&AccessibilityNode> for ElementSnapshot {
    fn from(node: &AccessibilityNode) -> Self {
        Self {
            resource_id: non_blank(&node.resource_id),
            content_desc: non_blank(&node.content_desc),
            text: non_blank(&node.text),
            class_name: non_blank(&node.class_name),
            bounds: node.parsed_bounds(),
            child_index: node.index.and_then(|i| usize::try_from(i).ok()),
        }
    }
}

fn non_blank(s: &str) -> Option<String> {
    (!s.trim().is_empty()).then(|| s.to_string())
}

fn first_string(attrs: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| attrs.get(*k))
        .find_map(|v| match v {
            Value::String(s) => non_blank(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| usize::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
