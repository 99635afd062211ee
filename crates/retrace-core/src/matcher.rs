use crate::a11y::{self, AccessibilityNode, Bounds};
use crate::{ElementSelector, SelectorChain, SelectorKind};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

pub const DEFAULT_BOUNDS_TOLERANCE: i32 = 10;

static XPATH_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*//([^\[\s/]+)").unwrap());
static XPATH_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@text\s*=\s*(?:'([^']*)'|"([^"]*)")"#).unwrap());
static XPATH_CONTENT_DESC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"@content-desc\s*=\s*(?:'([^']*)'|"([^"]*)")"#).unwrap());
static XPATH_RESOURCE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"contains\(\s*@resource-id\s*,\s*(?:'([^']*)'|"([^"]*)")\s*\)"#).unwrap()
});

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Maximum per-edge pixel difference for bounds selectors.
    pub bounds_tolerance: i32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            bounds_tolerance: DEFAULT_BOUNDS_TOLERANCE,
        }
    }
}

/// A node found for a selector chain.
#[derive(Debug, Clone, Copy)]
pub struct ElementMatch<'a> {
    pub node: &'a AccessibilityNode,
    pub selector: &'a ElementSelector,
    /// Position of `selector` in the chain; 0 is the primary selector.
    pub selector_index: usize,
}

impl ElementMatch<'_> {
    pub fn fallback_used(&self) -> bool {
        self.selector_index > 0
    }
}

/// Finds live accessibility nodes for recorded selectors.
///
/// Matching is structural and first-wins: the tree is scanned in pre-order
/// and the first node satisfying a selector is returned, without ranking
/// candidates against each other.
#[derive(Debug, Clone, Default)]
pub struct ElementMatcher {
    config: MatcherConfig,
}

impl ElementMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Try each selector of the chain in order; stop at the first one that
    /// matches any node.
    pub fn find<'a>(
        &self,
        tree: &'a [AccessibilityNode],
        chain: &'a SelectorChain,
    ) -> Option<ElementMatch<'a>> {
        let nodes = a11y::flatten(tree);
        for (selector_index, selector) in chain.iter().enumerate() {
            if let Some(node) = self.first_match(&nodes, selector) {
                debug!(
                    selector = %selector,
                    selector_index,
                    "selector matched"
                );
                return Some(ElementMatch {
                    node,
                    selector,
                    selector_index,
                });
            }
            debug!(selector = %selector, "selector did not match, trying next");
        }
        None
    }

    /// First node in pre-order matching a single selector.
    pub fn find_node<'a>(
        &self,
        tree: &'a [AccessibilityNode],
        selector: &ElementSelector,
    ) -> Option<&'a AccessibilityNode> {
        self.first_match(&a11y::flatten(tree), selector)
    }

    fn first_match<'a>(
        &self,
        nodes: &[&'a AccessibilityNode],
        selector: &ElementSelector,
    ) -> Option<&'a AccessibilityNode> {
        match selector.kind() {
            SelectorKind::Xpath => {
                let query = XPathQuery::parse(selector.value())?;
                nodes.iter().copied().find(|n| query.matches(n))
            }
            SelectorKind::Bounds => {
                let target = Bounds::parse(selector.value())?;
                nodes.iter().copied().find(|n| {
                    n.parsed_bounds()
                        .is_some_and(|b| b.within(&target, self.config.bounds_tolerance))
                })
            }
            _ => nodes.iter().copied().find(|n| self.matches(n, selector)),
        }
    }

    /// Whether a single node satisfies a selector.
    pub fn matches(&self, node: &AccessibilityNode, selector: &ElementSelector) -> bool {
        let value = selector.value();
        match selector.kind() {
            SelectorKind::ResourceId => resource_id_matches(&node.resource_id, value),
            SelectorKind::ContentDesc => node.content_desc == value,
            SelectorKind::Text => node.text == value,
            SelectorKind::Xpath => XPathQuery::parse(value).is_some_and(|q| q.matches(node)),
            SelectorKind::Bounds => match (Bounds::parse(value), node.parsed_bounds()) {
                (Some(target), Some(actual)) => {
                    actual.within(&target, self.config.bounds_tolerance)
                }
                _ => false,
            },
        }
    }
}

fn resource_id_matches(node_id: &str, wanted: &str) -> bool {
    if node_id.is_empty() {
        return false;
    }
    if node_id == wanted {
        return true;
    }
    match wanted.rsplit_once('/') {
        Some((_, tail)) if !tail.is_empty() => {
            node_id == tail || node_id.ends_with(&format!("/{}", tail))
        }
        Some(_) => false,
        // Bare names match the tail of a fully-qualified id.
        None => node_id.rsplit_once('/').is_some_and(|(_, tail)| tail == wanted),
    }
}

/// The subset of XPath produced by the selector generator.
#[derive(Debug, Clone, PartialEq)]
struct XPathQuery {
    class: String,
    text: Option<String>,
    content_desc: Option<String>,
    resource_id_fragment: Option<String>,
}

impl XPathQuery {
    fn parse(xpath: &str) -> Option<Self> {
        let class = XPATH_CLASS.captures(xpath)?.get(1)?.as_str().to_string();
        let quoted = |re: &Regex| {
            re.captures(xpath).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .map(|m| m.as_str().to_string())
            })
        };
        Some(Self {
            class,
            text: quoted(&XPATH_TEXT),
            content_desc: quoted(&XPATH_CONTENT_DESC),
            resource_id_fragment: quoted(&XPATH_RESOURCE_ID),
        })
    }

    fn matches(&self, node: &AccessibilityNode) -> bool {
        // A suffix check, so `Button` also accepts `android.widget.ImageButton`.
        let class_ok = self.class == "*" || node.class_name.ends_with(&self.class);
        class_ok
            && self.text.as_ref().is_none_or(|t| node.text == *t)
            && self
                .content_desc
                .as_ref()
                .is_none_or(|d| node.content_desc == *d)
            && self
                .resource_id_fragment
                .as_ref()
                .is_none_or(|f| node.resource_id.contains(f.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ElementSnapshot, SelectorGenerator};

    fn sel(kind: SelectorKind, value: &str) -> ElementSelector {
        ElementSelector::with_default_confidence(kind, value).unwrap()
    }

    fn node(
        class_name: &str,
        resource_id: &str,
        text: &str,
        content_desc: &str,
        bounds: &str,
    ) -> AccessibilityNode {
        AccessibilityNode {
            class_name: class_name.into(),
            resource_id: resource_id.into(),
            text: text.into(),
            content_desc: content_desc.into(),
            bounds: bounds.into(),
            ..Default::default()
        }
    }

    fn login_screen() -> Vec<AccessibilityNode> {
        vec![AccessibilityNode {
            class_name: "android.widget.FrameLayout".into(),
            bounds: "0,0,1080,2400".into(),
            children: vec![
                node(
                    "android.widget.EditText",
                    "com.app:id/username",
                    "",
                    "Username",
                    "40,300,1040,420",
                ),
                node(
                    "android.widget.Button",
                    "com.app:id/submit",
                    "Login",
                    "",
                    "100,200,300,400",
                ),
                node(
                    "android.widget.TextView",
                    "",
                    "Login",
                    "",
                    "100,900,300,960",
                ),
            ],
            ..Default::default()
        }]
    }

    #[test]
    fn falls_back_to_text_when_resource_id_is_gone() {
        let tree = login_screen();
        let chain = SelectorChain::new(vec![
            sel(SelectorKind::ResourceId, "com.app:id/btn_login"),
            sel(SelectorKind::Text, "Login"),
        ])
        .unwrap();
        let found = ElementMatcher::default().find(&tree, &chain).unwrap();
        assert_eq!(found.selector_index, 1);
        assert!(found.fallback_used());
        assert_eq!(found.node.resource_id, "com.app:id/submit");
    }

    #[test]
    fn first_structural_match_wins() {
        let tree = login_screen();
        let chain = SelectorChain::single(sel(SelectorKind::Text, "Login"));
        let found = ElementMatcher::default().find(&tree, &chain).unwrap();
        assert_eq!(found.node.class_name, "android.widget.Button");
    }

    #[test]
    fn earlier_selector_wins_even_if_later_is_more_specific() {
        let tree = login_screen();
        let chain = SelectorChain::new(vec![
            sel(SelectorKind::Xpath, "//TextView[@text='Login']"),
            sel(SelectorKind::ResourceId, "com.app:id/submit"),
        ])
        .unwrap();
        let found = ElementMatcher::default().find(&tree, &chain).unwrap();
        assert_eq!(found.selector_index, 0);
        assert_eq!(found.node.class_name, "android.widget.TextView");
    }

    #[test]
    fn exhausted_chain_is_not_found() {
        let tree = login_screen();
        let chain = SelectorChain::new(vec![
            sel(SelectorKind::ResourceId, "com.app:id/missing"),
            sel(SelectorKind::ContentDesc, "Nope"),
        ])
        .unwrap();
        assert!(ElementMatcher::default().find(&tree, &chain).is_none());
    }

    #[test]
    fn resource_id_tail_matching() {
        assert!(resource_id_matches("com.app:id/submit", "com.app:id/submit"));
        assert!(resource_id_matches("com.other:id/submit", "com.app:id/submit"));
        assert!(resource_id_matches("submit", "com.app:id/submit"));
        assert!(resource_id_matches("com.app:id/submit", "submit"));
        assert!(!resource_id_matches("com.app:id/resubmit", "com.app:id/submit"));
        assert!(!resource_id_matches("", "submit"));
    }

    #[test]
    fn content_desc_and_text_are_case_sensitive() {
        let matcher = ElementMatcher::default();
        let n = node("", "", "Login", "Username", NO_BOUNDS_STR);
        assert!(matcher.matches(&n, &sel(SelectorKind::Text, "Login")));
        assert!(!matcher.matches(&n, &sel(SelectorKind::Text, "login")));
        assert!(matcher.matches(&n, &sel(SelectorKind::ContentDesc, "Username")));
        assert!(!matcher.matches(&n, &sel(SelectorKind::ContentDesc, "username")));
    }

    const NO_BOUNDS_STR: &str = crate::a11y::NO_BOUNDS;

    #[test]
    fn xpath_requires_class_and_all_predicates() {
        let matcher = ElementMatcher::default();
        let button = node(
            "android.widget.Button",
            "com.app:id/submit",
            "Login",
            "",
            NO_BOUNDS_STR,
        );
        assert!(matcher.matches(&button, &sel(SelectorKind::Xpath, "//Button[@text='Login']")));
        assert!(matcher.matches(
            &button,
            &sel(SelectorKind::Xpath, "//Button[contains(@resource-id,'submit')]")
        ));
        assert!(matcher.matches(&button, &sel(SelectorKind::Xpath, "//Button[position()=3]")));
        assert!(matcher.matches(&button, &sel(SelectorKind::Xpath, "//*[@text='Login']")));
        assert!(!matcher.matches(&button, &sel(SelectorKind::Xpath, "//TextView[@text='Login']")));
        assert!(!matcher.matches(&button, &sel(SelectorKind::Xpath, "//Button[@text='Logout']")));
        assert!(!matcher.matches(
            &button,
            &sel(SelectorKind::Xpath, "//Button[@content-desc='Login']")
        ));
        assert!(!matcher.matches(&button, &sel(SelectorKind::Xpath, "Button")));
    }

    #[test]
    fn xpath_class_is_a_suffix_of_the_node_class() {
        let matcher = ElementMatcher::default();
        let image_button = node("android.widget.ImageButton", "", "Go", "", NO_BOUNDS_STR);
        assert!(matcher.matches(&image_button, &sel(SelectorKind::Xpath, "//Button[@text='Go']")));
        assert!(matcher.matches(
            &image_button,
            &sel(SelectorKind::Xpath, "//android.widget.ImageButton[@text='Go']")
        ));
        assert!(!matcher.matches(&image_button, &sel(SelectorKind::Xpath, "//ImageView[@text='Go']")));
        let unnamed = node("", "", "Go", "", NO_BOUNDS_STR);
        assert!(!matcher.matches(&unnamed, &sel(SelectorKind::Xpath, "//Button[@text='Go']")));
        assert!(matcher.matches(&unnamed, &sel(SelectorKind::Xpath, "//*[@text='Go']")));
    }

    #[test]
    fn bounds_tolerance_boundary() {
        let matcher = ElementMatcher::default();
        let n = node("", "", "", "", "100,200,300,400");
        assert!(matcher.matches(&n, &sel(SelectorKind::Bounds, "110,190,310,410")));
        assert!(!matcher.matches(&n, &sel(SelectorKind::Bounds, "111,200,300,400")));
        assert!(!matcher.matches(&n, &sel(SelectorKind::Bounds, "100,200,300,389")));
    }

    #[test]
    fn bracketed_bounds_selector_matches_nearby_node() {
        let tree = vec![node("", "", "", "", "102,198,301,399")];
        let chain = SelectorChain::single(sel(SelectorKind::Bounds, "[100,200][300,400]"));
        assert!(ElementMatcher::default().find(&tree, &chain).is_some());
    }

    #[test]
    fn degenerate_node_bounds_never_match() {
        let matcher = ElementMatcher::default();
        let n = node("", "", "", "", NO_BOUNDS_STR);
        assert!(!matcher.matches(&n, &sel(SelectorKind::Bounds, "bounds=[0,0,5,5]")));
    }

    #[test]
    fn generated_selector_matches_its_own_node_via_primary() {
        let generator = SelectorGenerator::default();
        let matcher = ElementMatcher::default();
        let tree = login_screen();
        for original in a11y::flatten(&tree) {
            let snapshot = ElementSnapshot::from(original);
            let chain = generator.generate(&snapshot).unwrap();
            let rebuilt = vec![original.clone()];
            let found = matcher.find(&rebuilt, &chain).unwrap();
            assert_eq!(found.selector_index, 0, "chain {}", chain);
            assert!(!found.fallback_used());
        }
    }
}
