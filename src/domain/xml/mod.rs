//! Minimal XML document model.
//!
//! Just enough DOM to sign and verify documents: elements keep their
//! qualified names and attributes (namespace declarations included) in
//! document order, so that canonicalization can reason about namespace scope
//! the same way an XPath node-set would.

pub mod c14n;
pub mod parse;
pub mod serialize;

pub use c14n::{canonicalize_document, canonicalize_subtree};
pub use parse::{parse_document, parse_document_with_max_depth};
pub use serialize::serialize_document;

use crate::domain::constants::XML_NS;

/// A node inside an element or at document level
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

/// Attribute as written in the source, e.g. `xmlns:ds` or `Id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    /// Namespace declaration prefix: `Some("")` for `xmlns`, `Some(p)` for `xmlns:p`
    #[must_use]
    pub fn declared_prefix(&self) -> Option<&str> {
        if self.name == "xmlns" {
            Some("")
        } else {
            self.name.strip_prefix("xmlns:")
        }
    }

    #[must_use]
    pub fn is_namespace_declaration(&self) -> bool {
        self.declared_prefix().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Concatenated text of the direct text children
    #[must_use]
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Namespace URI bound to `prefix` on this element only.
    fn declared_namespace(&self, prefix: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.declared_prefix() == Some(prefix))
            .map(|a| a.value.as_str())
    }
}

/// Split `p:local` into (`Some("p")`, `"local"`)
#[must_use]
pub fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}

/// Resolve `prefix` (`""` for the default namespace) at `element`, whose
/// ancestors are given outermost first. An empty binding means "no namespace".
#[must_use]
pub fn lookup_namespace<'a>(
    ancestors: &[&'a Element],
    element: &'a Element,
    prefix: &str,
) -> Option<&'a str> {
    if prefix == "xml" {
        return Some(XML_NS);
    }
    std::iter::once(element)
        .chain(ancestors.iter().rev().copied())
        .find_map(|e| e.declared_namespace(prefix))
        .filter(|uri| !uri.is_empty())
}

/// Namespace URI of the element itself
#[must_use]
pub fn element_namespace<'a>(ancestors: &[&'a Element], element: &'a Element) -> Option<&'a str> {
    lookup_namespace(ancestors, element, element.prefix().unwrap_or(""))
}

/// Element found in a tree together with its ancestor chain (outermost first)
#[derive(Debug, Clone)]
pub struct Located<'a> {
    pub ancestors: Vec<&'a Element>,
    pub element: &'a Element,
}

impl<'a> Located<'a> {
    /// Ancestor chain to use for this element's children
    #[must_use]
    pub fn child_ancestors(&self) -> Vec<&'a Element> {
        let mut chain = self.ancestors.clone();
        chain.push(self.element);
        chain
    }

    /// First direct child with the given namespace and local name
    #[must_use]
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<Located<'a>> {
        let ancestors = self.child_ancestors();
        self.element
            .child_elements()
            .find(|child| {
                child.local_name() == local_name
                    && element_namespace(&ancestors, child) == Some(namespace)
            })
            .map(|child| Located {
                ancestors: ancestors.clone(),
                element: child,
            })
    }

    /// All direct children with the given namespace and local name
    #[must_use]
    pub fn children(&self, namespace: &str, local_name: &str) -> Vec<Located<'a>> {
        let ancestors = self.child_ancestors();
        self.element
            .child_elements()
            .filter(|child| {
                child.local_name() == local_name
                    && element_namespace(&ancestors, child) == Some(namespace)
            })
            .map(|child| Located {
                ancestors: ancestors.clone(),
                element: child,
            })
            .collect()
    }

    /// Follow a path of (namespace, local name) steps through direct children
    #[must_use]
    pub fn descend(&self, path: &[(&str, &str)]) -> Option<Located<'a>> {
        let mut current = self.clone();
        for (namespace, local_name) in path {
            current = current.child(namespace, local_name)?;
        }
        Some(current)
    }
}

/// Depth-first, document-order search for the first element matching `predicate`.
pub fn find_element<'a, F>(root: &'a Element, mut predicate: F) -> Option<Located<'a>>
where
    F: FnMut(&[&'a Element], &'a Element) -> bool,
{
    let mut ancestors = Vec::new();
    find_recursive(root, &mut ancestors, &mut predicate)
}

fn find_recursive<'a, F>(
    element: &'a Element,
    ancestors: &mut Vec<&'a Element>,
    predicate: &mut F,
) -> Option<Located<'a>>
where
    F: FnMut(&[&'a Element], &'a Element) -> bool,
{
    if predicate(ancestors, element) {
        return Some(Located {
            ancestors: ancestors.clone(),
            element,
        });
    }
    ancestors.push(element);
    for child in element.child_elements() {
        if let Some(found) = find_recursive(child, ancestors, predicate) {
            return Some(found);
        }
    }
    ancestors.pop();
    None
}

/// A parsed XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Comments and processing instructions before the document element
    pub prolog: Vec<Node>,
    pub root: Element,
    /// Comments and processing instructions after the document element
    pub epilog: Vec<Node>,
}

impl Document {
    #[must_use]
    pub fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
            epilog: Vec::new(),
        }
    }

    #[must_use]
    pub fn root_located(&self) -> Located<'_> {
        Located {
            ancestors: Vec::new(),
            element: &self.root,
        }
    }
}
