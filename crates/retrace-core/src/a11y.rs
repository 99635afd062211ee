//! Accessibility tree snapshot as reported by the device.
//!
//! Nodes are read-only inputs: the tree is fetched again before every step
//! that needs it, and nothing here keeps it alive across steps.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Literal bounds string the device reports when it has none.
pub const NO_BOUNDS: &str = "0,0,0,0";

/// On-screen rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Returns `None` for the degenerate all-zero box and for inverted boxes.
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Option<Self> {
        let bounds = Self {
            left,
            top,
            right,
            bottom,
        };
        if bounds.is_degenerate() || right < left || bottom < top {
            return None;
        }
        Some(bounds)
    }

    /// Parse any of the forms seen in the wild:
    /// `L,T,R,B`, `[L,T,R,B]`, `bounds=[L,T,R,B]` and `[L,T][R,B]`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let s = s.strip_prefix("bounds=").unwrap_or(s);
        let flattened = s.replace("][", ",");
        let coords: Vec<i32> = flattened
            .split(',')
            .map(|part| part.trim().trim_matches(|c| c == '[' || c == ']').trim())
            .map(parse_coordinate)
            .collect::<Option<Vec<_>>>()?;
        match coords.as_slice() {
            [left, top, right, bottom] => Self::new(*left, *top, *right, *bottom),
            _ => None,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.left == 0 && self.top == 0 && self.right == 0 && self.bottom == 0
    }

    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    pub fn center(&self) -> (i32, i32) {
        (midpoint(self.left, self.right), midpoint(self.top, self.bottom))
    }

    /// True when every edge is within `tolerance` pixels of `other`'s.
    pub fn within(&self, other: &Bounds, tolerance: i32) -> bool {
        let Ok(tolerance) = u32::try_from(tolerance) else {
            return false;
        };
        self.left.abs_diff(other.left) <= tolerance
            && self.top.abs_diff(other.top) <= tolerance
            && self.right.abs_diff(other.right) <= tolerance
            && self.bottom.abs_diff(other.bottom) <= tolerance
    }

    /// Serialized form used for bounds selectors.
    pub fn to_selector_value(&self) -> String {
        format!(
            "bounds=[{},{},{},{}]",
            self.left, self.top, self.right, self.bottom
        )
    }
}

fn midpoint(a: i32, b: i32) -> i32 {
    // The mean of two i32 values always fits back into one.
    ((i64::from(a) + i64::from(b)) / 2) as i32
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.left, self.top, self.right, self.bottom
        )
    }
}

fn parse_coordinate(s: &str) -> Option<i32> {
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    let v = s.parse::<f64>().ok()?;
    (v.is_finite() && v.abs() < i32::MAX as f64).then(|| v.round() as i32)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityNode {
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub text: String,
    #[serde(default, deserialize_with = "nullable", alias = "class_name", alias = "class")]
    pub class_name: String,
    #[serde(default, deserialize_with = "nullable", alias = "resource_id", alias = "resource-id")]
    pub resource_id: String,
    #[serde(
        rename = "contentDescription",
        default,
        deserialize_with = "nullable",
        alias = "content_desc",
        alias = "content-desc",
        alias = "contentDesc"
    )]
    pub content_desc: String,
    #[serde(default = "no_bounds", deserialize_with = "bounds_string")]
    pub bounds: String,
    #[serde(default, deserialize_with = "nullable", alias = "isClickable")]
    pub clickable: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub children: Vec<AccessibilityNode>,
}

impl Default for AccessibilityNode {
    fn default() -> Self {
        Self {
            index: None,
            text: String::new(),
            class_name: String::new(),
            resource_id: String::new(),
            content_desc: String::new(),
            bounds: no_bounds(),
            clickable: false,
            children: vec![],
        }
    }
}

impl AccessibilityNode {
    /// Parsed bounds, or `None` when the node has no usable rectangle.
    pub fn parsed_bounds(&self) -> Option<Bounds> {
        Bounds::parse(&self.bounds)
    }

    /// Class name without its package, e.g. `Button` for `android.widget.Button`.
    pub fn simple_class_name(&self) -> &str {
        simple_class_name(&self.class_name)
    }
}

pub fn simple_class_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}

/// Pre-order flattening of a forest: each node, then its children left to right.
pub fn flatten(tree: &[AccessibilityNode]) -> Vec<&AccessibilityNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&AccessibilityNode> = tree.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(node);
        stack.extend(node.children.iter().rev());
    }
    out
}

/// Union of the root nodes' bounds, used as the screen rectangle.
pub fn screen_bounds(tree: &[AccessibilityNode]) -> Option<Bounds> {
    tree.iter()
        .filter_map(AccessibilityNode::parsed_bounds)
        .reduce(|a, b| Bounds {
            left: a.left.min(b.left),
            top: a.top.min(b.top),
            right: a.right.max(b.right),
            bottom: a.bottom.max(b.bottom),
        })
}

fn no_bounds() -> String {
    NO_BOUNDS.to_string()
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts the bounds as a string, a `{left,top,right,bottom}` object, or null.
fn bounds_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(bounds_from_value(&value).unwrap_or_else(no_bounds))
}

pub(crate) fn bounds_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            let edge = |key: &str| map.get(key).and_then(Value::as_f64);
            Some(format!(
                "{},{},{},{}",
                edge("left")?.round() as i64,
                edge("top")?.round() as i64,
                edge("right")?.round() as i64,
                edge("bottom")?.round() as i64
            ))
        }
        _ => None,
    }
}
