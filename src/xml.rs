//! Element lookups over CAS response documents.
//!
//! CAS servers qualify every element with the `cas:` namespace (and SAML
//! logout requests with `samlp:`/`saml:`), but prefixes vary between server
//! releases, so elements are matched on their local name.

use roxmltree::{Document, Node};

use crate::error::{CasError, Result};

pub(crate) fn parse(body: &str) -> Result<Document<'_>> {
    Document::parse(body.trim_start()).map_err(|e| CasError::malformed(format!("invalid XML: {e}")))
}

pub(crate) fn is_element(node: &Node<'_, '_>, local_name: &str) -> bool {
    node.is_element() && node.tag_name().name() == local_name
}

/// First element named `local_name` at any depth below `node`.
pub(crate) fn find<'a, 'input>(node: Node<'a, 'input>, local_name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| is_element(n, local_name))
}

/// First direct child element named `local_name`.
pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, local_name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| is_element(n, local_name))
}

/// Concatenated text of `node` and its descendants, trimmed.
pub(crate) fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Trimmed text of a direct child, `None` when missing or blank.
pub(crate) fn child_text(node: Node<'_, '_>, local_name: &str) -> Option<String> {
    child(node, local_name).map(text_content).filter(|text| !text.is_empty())
}
