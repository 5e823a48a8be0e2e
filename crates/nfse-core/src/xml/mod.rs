//! Namespace-tolerant element lookup over `roxmltree` documents.
//!
//! Invoice files in the wild declare namespaces inconsistently: some use a
//! default namespace, some prefix every element, some use none at all. Every
//! lookup here first matches the local name under any namespace and only then
//! falls back to the qualified `prefix:local` name as written in the source.

use std::borrow::Cow;

use roxmltree::Node;

/// Tag name without namespace.
pub fn local_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Tag name as written in the source, including its prefix if it has one.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use nfse_core::xml::qualified_name;
///
/// let doc = Document::parse(r#"<n:a xmlns:n="urn:x"><b/></n:a>"#).unwrap();
/// assert_eq!(qualified_name(doc.root_element()), "n:a");
/// ```
pub fn qualified_name<'a>(node: Node<'a, '_>) -> Cow<'a, str> {
    let name = node.tag_name().name();
    let prefix = node
        .tag_name()
        .namespace()
        .and_then(|uri| node.lookup_prefix(uri))
        .filter(|p| !p.is_empty());

    match prefix {
        Some(prefix) => Cow::Owned(format!("{prefix}:{name}")),
        None => Cow::Borrowed(name),
    }
}

fn descendant_elements<'a, 'input: 'a>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.descendants().skip(1).filter(|n| n.is_element())
}

/// Find the first descendant element (the node itself excluded) named `tag`.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use nfse_core::xml::find_element;
///
/// let xml = r#"<a xmlns="urn:x"><b><Numero>1</Numero></b></a>"#;
/// let doc = Document::parse(xml).unwrap();
/// let found = find_element(doc.root_element(), "Numero").unwrap();
/// assert_eq!(found.text(), Some("1"));
/// ```
pub fn find_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    descendant_elements(node)
        .find(|n| local_name(*n) == tag)
        .or_else(|| descendant_elements(node).find(|n| qualified_name(*n) == tag))
}

/// Find every descendant element named `tag`, in document order.
pub fn find_all<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Vec<Node<'a, 'input>> {
    let by_local: Vec<_> = descendant_elements(node)
        .filter(|n| local_name(*n) == tag)
        .collect();
    if !by_local.is_empty() {
        return by_local;
    }

    descendant_elements(node)
        .filter(|n| qualified_name(*n) == tag)
        .collect()
}

/// Find the first direct child element named `tag`.
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    let children = || node.children().filter(|n| n.is_element());
    children()
        .find(|n| local_name(*n) == tag)
        .or_else(|| children().find(|n| qualified_name(*n) == tag))
}

/// Follow a chain of descendant lookups, e.g. `["IBSCBS", "valores"]`.
pub fn find_path<'a, 'input>(node: Node<'a, 'input>, path: &[&str]) -> Option<Node<'a, 'input>> {
    path.iter()
        .try_fold(node, |current, tag| find_element(current, tag))
}

/// All text below `node` concatenated, trimmed.
pub fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Text of the first descendant named `tag`, or `None` if missing or blank.
pub fn element_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    find_element(node, tag)
        .map(text_content)
        .filter(|text| !text.is_empty())
}

/// Whether `node` or anything below it is the element `{namespace}tag`.
pub fn contains_namespaced(node: Node<'_, '_>, namespace: &str, tag: &str) -> bool {
    node.descendants()
        .any(|n| n.is_element() && n.has_tag_name((namespace, tag)))
}
