use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

/// Elements whose text is never content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// All text nodes below `root` in document order (depth-first, pre-order).
///
/// The walk keeps its own stack of arena node references instead of
/// recursing, so deeply nested markup cannot exhaust the call stack.
pub fn descendant_texts<'a>(root: ElementRef<'a>) -> Vec<&'a str> {
    let mut texts = Vec::new();
    let mut stack: Vec<NodeRef<'a, Node>> = root.children().rev().collect();
    while let Some(node) = stack.pop() {
        match node.value() {
            Node::Text(text) => texts.push(&**text),
            Node::Element(element) => {
                if SKIPPED_ELEMENTS.contains(&element.name()) {
                    continue;
                }
                stack.extend(node.children().rev());
            }
            _ => {}
        }
    }
    texts
}

/// Direct text children of `element`, in order. Nested elements are ignored.
pub fn direct_texts<'a>(element: ElementRef<'a>) -> impl Iterator<Item = &'a str> {
    element
        .children()
        .filter_map(|child| child.value().as_text().map(|text| &**text))
}

/// Collapse whitespace runs (including non-breaking and ideographic spaces
/// and literal `&nbsp;` left by double escaping) to single spaces, trimmed.
pub fn collapse_whitespace(raw: &str) -> String {
    let unescaped = raw.replace("&nbsp;", " ");
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}
