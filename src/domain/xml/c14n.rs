//! Canonical XML 1.0 (inclusive, without comments).
//!
//! Two entry points mirror the two node-sets XML-DSig references produce:
//! the whole document (`URI=""`, optionally minus the enveloped signature) and
//! a subtree selected by Id (`URI="#id"`), whose apex element receives every
//! in-scope namespace and inherited `xml:*` attribute.

use super::{split_qname, Attribute, Document, Element, Node};
use crate::domain::constants::XML_NS;
use std::collections::BTreeMap;

/// Canonicalize a whole document.
///
/// `exclude` removes one element subtree (by identity) from the node-set,
/// which is how the enveloped-signature transform is applied.
#[must_use]
pub fn canonicalize_document(document: &Document, exclude: Option<&Element>) -> Vec<u8> {
    let mut canonicalizer = Canonicalizer::new(exclude);
    for node in &document.prolog {
        if let Node::ProcessingInstruction { target, data } = node {
            canonicalizer.write_pi(target, data);
            canonicalizer.out.push('\n');
        }
    }
    canonicalizer.write_element(
        &document.root,
        &BTreeMap::new(),
        &BTreeMap::new(),
        &[],
    );
    for node in &document.epilog {
        if let Node::ProcessingInstruction { target, data } = node {
            canonicalizer.out.push('\n');
            canonicalizer.write_pi(target, data);
        }
    }
    canonicalizer.out.into_bytes()
}

/// Canonicalize the subtree rooted at `element`, whose ancestors are given
/// outermost first. Only the ancestors' attributes are consulted.
#[must_use]
pub fn canonicalize_subtree(
    ancestors: &[&Element],
    element: &Element,
    exclude: Option<&Element>,
) -> Vec<u8> {
    let mut in_scope = BTreeMap::new();
    let mut inherited_xml = BTreeMap::new();
    for ancestor in ancestors {
        apply_declarations(&mut in_scope, ancestor);
        for attribute in &ancestor.attributes {
            if attribute.name.starts_with("xml:") {
                inherited_xml.insert(attribute.name.clone(), attribute.value.clone());
            }
        }
    }
    for attribute in &element.attributes {
        inherited_xml.remove(&attribute.name);
    }
    let inherited: Vec<Attribute> = inherited_xml
        .into_iter()
        .map(|(name, value)| Attribute { name, value })
        .collect();

    let mut canonicalizer = Canonicalizer::new(exclude);
    canonicalizer.write_element(element, &in_scope, &BTreeMap::new(), &inherited);
    canonicalizer.out.into_bytes()
}

/// Namespace bindings by prefix; `""` is the default namespace and an empty
/// URI means the default namespace is undeclared.
type Bindings = BTreeMap<String, String>;

fn apply_declarations(bindings: &mut Bindings, element: &Element) {
    for attribute in &element.attributes {
        if let Some(prefix) = attribute.declared_prefix() {
            bindings.insert(prefix.to_string(), attribute.value.clone());
        }
    }
}

struct Canonicalizer<'e> {
    out: String,
    exclude: Option<&'e Element>,
}

impl<'e> Canonicalizer<'e> {
    fn new(exclude: Option<&'e Element>) -> Self {
        Self {
            out: String::with_capacity(1024),
            exclude,
        }
    }

    fn is_excluded(&self, element: &Element) -> bool {
        self.exclude
            .is_some_and(|excluded| std::ptr::eq(excluded, element))
    }

    /// `parent_scope` holds the bindings in scope at the parent; `rendered`
    /// holds what the nearest output ancestor made visible.
    fn write_element(
        &mut self,
        element: &Element,
        parent_scope: &Bindings,
        rendered: &Bindings,
        extra_attributes: &[Attribute],
    ) {
        let mut scope = parent_scope.clone();
        apply_declarations(&mut scope, element);

        let mut namespaces = Vec::new();
        let mut now_rendered = rendered.clone();
        for (prefix, uri) in &scope {
            if prefix == "xml" {
                continue;
            }
            let visible = rendered.get(prefix).map_or("", String::as_str);
            let needed = if prefix.is_empty() && uri.is_empty() {
                !visible.is_empty()
            } else {
                visible != uri || !rendered.contains_key(prefix)
            };
            if needed {
                namespaces.push((prefix.clone(), uri.clone()));
                now_rendered.insert(prefix.clone(), uri.clone());
            }
        }

        let mut attributes: Vec<(String, String, &Attribute)> = element
            .attributes
            .iter()
            .chain(extra_attributes.iter())
            .filter(|a| !a.is_namespace_declaration())
            .map(|a| {
                let (prefix, local) = split_qname(&a.name);
                let namespace = match prefix {
                    Some("xml") => XML_NS.to_string(),
                    Some(p) => scope.get(p).cloned().unwrap_or_default(),
                    None => String::new(),
                };
                (namespace, local.to_string(), a)
            })
            .collect();
        attributes.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        self.out.push('<');
        self.out.push_str(&element.name);
        for (prefix, uri) in &namespaces {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            self.escape_attribute(uri);
            self.out.push('"');
        }
        for (_, _, attribute) in &attributes {
            self.out.push(' ');
            self.out.push_str(&attribute.name);
            self.out.push_str("=\"");
            self.escape_attribute(&attribute.value);
            self.out.push('"');
        }
        self.out.push('>');

        for child in &element.children {
            match child {
                Node::Element(child) if self.is_excluded(child) => {}
                Node::Element(child) => self.write_element(child, &scope, &now_rendered, &[]),
                Node::Text(text) => self.escape_text(text),
                Node::Comment(_) => {}
                Node::ProcessingInstruction { target, data } => self.write_pi(target, data),
            }
        }

        self.out.push_str("</");
        self.out.push_str(&element.name);
        self.out.push('>');
    }

    fn write_pi(&mut self, target: &str, data: &str) {
        self.out.push_str("<?");
        self.out.push_str(target);
        if !data.is_empty() {
            self.out.push(' ');
            self.out.push_str(data);
        }
        self.out.push_str("?>");
    }

    fn escape_text(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                '\r' => self.out.push_str("&#xD;"),
                _ => self.out.push(c),
            }
        }
    }

    fn escape_attribute(&mut self, value: &str) {
        for c in value.chars() {
            match c {
                '&' => self.out.push_str("&amp;"),
                '<' => self.out.push_str("&lt;"),
                '"' => self.out.push_str("&quot;"),
                '\t' => self.out.push_str("&#x9;"),
                '\n' => self.out.push_str("&#xA;"),
                '\r' => self.out.push_str("&#xD;"),
                _ => self.out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{find_element, parse_document};
    use super::*;

    fn c14n(input: &str) -> String {
        let doc = parse_document(input.as_bytes()).unwrap();
        String::from_utf8(canonicalize_document(&doc, None)).unwrap()
    }

    #[test]
    fn expands_empty_elements_and_drops_declaration() {
        assert_eq!(
            c14n("<?xml version=\"1.0\"?>\n<Root><Value>42</Value><Empty/></Root>"),
            "<Root><Value>42</Value><Empty></Empty></Root>"
        );
    }

    #[test]
    fn sorts_attributes_and_namespaces() {
        // Example adapted from the Canonical XML recommendation, section 3.3
        let input = r#"<e5 xmlns="http://example.org" xmlns:b="http://www.ietf.org" xmlns:a="http://www.w3.org" a:attr="out" b:attr="sorted" attr2="all" attr="I'm"/>"#;
        assert_eq!(
            c14n(input),
            r#"<e5 xmlns="http://example.org" xmlns:a="http://www.w3.org" xmlns:b="http://www.ietf.org" attr="I'm" attr2="all" b:attr="sorted" a:attr="out"></e5>"#
        );
    }

    #[test]
    fn removes_superfluous_namespace_declarations() {
        let input = r#"<a xmlns:p="urn:p"><b xmlns:p="urn:p"><c xmlns:p="urn:q"/></b></a>"#;
        assert_eq!(
            c14n(input),
            r#"<a xmlns:p="urn:p"><b><c xmlns:p="urn:q"></c></b></a>"#
        );
    }

    #[test]
    fn empty_default_namespace_only_when_needed() {
        assert_eq!(c14n(r#"<a xmlns=""><b/></a>"#), "<a><b></b></a>");
        assert_eq!(
            c14n(r#"<a xmlns="urn:x"><b xmlns=""/></a>"#),
            r#"<a xmlns="urn:x"><b xmlns=""></b></a>"#
        );
    }

    #[test]
    fn escapes_text_and_attributes() {
        let input = "<a x=\"&quot;&#9;&#10;&#13;&amp;&lt;>\">&amp;&lt;&gt;&#13;\"'</a>";
        assert_eq!(
            c14n(input),
            "<a x=\"&quot;&#x9;&#xA;&#xD;&amp;&lt;>\">&amp;&lt;&gt;&#xD;\"'</a>"
        );
    }

    #[test]
    fn drops_comments_keeps_pis() {
        let input = "<?pi first?><!--x--><a><!--y--><?inner?></a><!--z--><?pi last?>";
        assert_eq!(
            c14n(input),
            "<?pi first?>\n<a><?inner?></a>\n<?pi last?>"
        );
    }

    #[test]
    fn subtree_apex_receives_in_scope_namespaces() {
        let doc = parse_document(
            br#"<r xmlns="urn:d" xmlns:p="urn:p" xml:lang="es"><p:s Id="x" b="1"><t/></p:s></r>"#,
        )
        .unwrap();
        let located = find_element(&doc.root, |_, e| e.attribute("Id") == Some("x")).unwrap();
        let out = canonicalize_subtree(&located.ancestors, located.element, None);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            r#"<p:s xmlns="urn:d" xmlns:p="urn:p" Id="x" b="1" xml:lang="es"><t></t></p:s>"#
        );
    }

    #[test]
    fn excludes_subtree_by_identity() {
        let doc = parse_document(b"<r><keep/><drop><x/></drop>tail</r>").unwrap();
        let drop = find_element(&doc.root, |_, e| e.name == "drop").unwrap();
        let out = canonicalize_document(&doc, Some(drop.element));
        assert_eq!(String::from_utf8(out).unwrap(), "<r><keep></keep>tail</r>");
    }
}
