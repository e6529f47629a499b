//! XML parsing into the document model.
//!
//! Applies the normalizations a conforming XML processor performs (line-end
//! normalization, attribute-value whitespace normalization, entity expansion)
//! so canonicalization sees the same infoset a standard verifier would.
//!
//! General entities declared in the internal DTD subset are expanded when
//! their replacement text is character data. External entities, parameter
//! entities and replacement text containing markup are not supported.

use super::{Attribute, Document, Element, Node};
use crate::domain::constants::{MAX_ELEMENT_DEPTH, MAX_ENTITY_EXPANSION, XML_NS};
use crate::infra::error::{PipelineError, PipelineResult};
use quick_xml::escape::unescape_with;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Internal general entity declaration with a quoted literal value
static ENTITY_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([^\s%"'>]+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#)
        .expect("entity declaration regex is valid")
});

static ENTITY_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([^#;&\s]+);").expect("entity reference regex is valid"));

/// Parse well-formed UTF-8 XML.
///
/// Fails with `XmlParseError` on malformed markup, mismatched or unclosed
/// tags, multiple or missing document elements, text outside the document
/// element, unknown entities, unbound namespace prefixes, characters outside
/// the XML `Char` production, nesting deeper than [`MAX_ELEMENT_DEPTH`], and
/// non-UTF-8 input.
pub fn parse_document(bytes: &[u8]) -> PipelineResult<Document> {
    parse_document_with_max_depth(bytes, MAX_ELEMENT_DEPTH)
}

/// [`parse_document`] with an explicit element nesting limit.
pub fn parse_document_with_max_depth(bytes: &[u8], max_depth: usize) -> PipelineResult<Document> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::XmlParseError(format!("input is not valid UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    check_chars(text, "document")?;

    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut prolog = Vec::new();
    let mut epilog = Vec::new();
    let mut root: Option<Element> = None;
    let mut entities = Entities::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            PipelineError::XmlParseError(format!("at byte {}: {e}", reader.error_position()))
        })?;

        match event {
            Event::Start(start) => {
                check_depth(&stack, max_depth)?;
                let element = element_from_start(&start, &stack, &mut entities)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                check_depth(&stack, max_depth)?;
                let element = element_from_start(&start, &stack, &mut entities)?;
                attach(Node::Element(element), &mut stack, &mut root, &mut prolog, &mut epilog)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    PipelineError::XmlParseError("end tag without matching start tag".to_string())
                })?;
                attach(Node::Element(element), &mut stack, &mut root, &mut prolog, &mut epilog)?;
            }
            Event::Text(raw) => {
                let raw = utf8(&raw)?;
                let normalized = normalize_line_endings(raw);
                let value = entities.expand(&normalized, "text")?;
                push_text(value, &mut stack)?;
            }
            Event::CData(raw) => {
                if stack.is_empty() {
                    return Err(PipelineError::XmlParseError(
                        "CDATA section outside the document element".to_string(),
                    ));
                }
                push_text(normalize_line_endings(utf8(&raw)?), &mut stack)?;
            }
            Event::Comment(raw) => {
                let comment = Node::Comment(normalize_line_endings(utf8(&raw)?));
                attach(comment, &mut stack, &mut root, &mut prolog, &mut epilog)?;
            }
            Event::PI(pi) => {
                let target = utf8(pi.target())?.to_string();
                let data = normalize_line_endings(utf8(pi.content())?.trim_start());
                let node = Node::ProcessingInstruction { target, data };
                attach(node, &mut stack, &mut root, &mut prolog, &mut epilog)?;
            }
            Event::Decl(decl) => {
                if let Some(encoding) = decl.encoding() {
                    let encoding = encoding.map_err(|e| {
                        PipelineError::XmlParseError(format!("invalid XML declaration: {e}"))
                    })?;
                    let encoding = utf8(&encoding)?;
                    if !encoding.eq_ignore_ascii_case("utf-8") {
                        return Err(PipelineError::XmlParseError(format!(
                            "unsupported document encoding '{encoding}', only UTF-8 is accepted"
                        )));
                    }
                }
            }
            Event::DocType(doctype) => {
                if root.is_some() || !stack.is_empty() {
                    return Err(PipelineError::XmlParseError(
                        "DOCTYPE after the document element".to_string(),
                    ));
                }
                entities.declare_all(&normalize_line_endings(utf8(&doctype)?))?;
            }
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.last() {
        return Err(PipelineError::XmlParseError(format!(
            "unexpected end of input: element <{}> is not closed",
            open.name
        )));
    }

    let root = root.ok_or_else(|| {
        PipelineError::XmlParseError("document has no root element".to_string())
    })?;

    Ok(Document {
        prolog,
        root,
        epilog,
    })
}

fn check_depth(open: &[Element], max_depth: usize) -> PipelineResult<()> {
    if open.len() >= max_depth {
        return Err(PipelineError::XmlParseError(format!(
            "element nesting exceeds the limit of {max_depth} levels"
        )));
    }
    Ok(())
}

/// XML 1.0 `Char`; surrogates are already excluded by `char`
fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\t' | '\n' | '\r'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

fn check_chars(text: &str, context: &str) -> PipelineResult<()> {
    match text.char_indices().find(|&(_, c)| !is_xml_char(c)) {
        Some((at, c)) => Err(PipelineError::XmlParseError(format!(
            "character U+{:04X} is not allowed in XML ({context}, byte {at})",
            u32::from(c)
        ))),
        None => Ok(()),
    }
}

/// General entities from the internal DTD subset, fully expanded
#[derive(Default)]
struct Entities {
    values: HashMap<String, String>,
    /// Bytes produced so far by expanding declared entities
    budget_used: usize,
}

impl Entities {
    fn declare_all(&mut self, doctype: &str) -> PipelineResult<()> {
        for declaration in ENTITY_DECLARATION.captures_iter(doctype) {
            let name = &declaration[1];
            let literal = declaration
                .get(2)
                .or_else(|| declaration.get(3))
                .map_or("", |m| m.as_str());
            // The first declaration binds; the predefined five cannot be redefined
            if predefined_entity(name).is_some() || self.values.contains_key(name) {
                continue;
            }
            let replacement = expand_char_references(literal)?;
            if replacement.contains('<') {
                return Err(PipelineError::XmlParseError(format!(
                    "entity '{name}' contains markup, which is not supported"
                )));
            }
            let value = self.expand(&replacement, "entity declaration")?;
            check_chars(&value, "entity value")?;
            self.values.insert(name.to_string(), value);
        }
        log::debug!("Declared {} internal entities", self.values.len());
        Ok(())
    }

    /// Resolve character and entity references in `raw`
    fn expand(&mut self, raw: &str, context: &str) -> PipelineResult<String> {
        if !raw.contains('&') {
            return Ok(raw.to_string());
        }
        if !self.values.is_empty() {
            let added: usize = ENTITY_REFERENCE
                .captures_iter(raw)
                .filter_map(|r| self.values.get(&r[1]))
                .map(String::len)
                .sum();
            self.budget_used = self.budget_used.saturating_add(added);
            if self.budget_used > MAX_ENTITY_EXPANSION {
                return Err(PipelineError::XmlParseError(format!(
                    "entity expansion exceeds {MAX_ENTITY_EXPANSION} bytes"
                )));
            }
        }
        let values = &self.values;
        let expanded = unescape_with(raw, |name| {
            predefined_entity(name).or_else(|| values.get(name).map(String::as_str))
        })
        .map_err(|e| PipelineError::XmlParseError(format!("invalid {context}: {e}")))?;
        check_chars(&expanded, context)?;
        Ok(expanded.into_owned())
    }
}

fn predefined_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Replace `&#N;` and `&#xN;` in an entity literal, leaving general
/// references for expansion at the point of use.
fn expand_char_references(literal: &str) -> PipelineResult<String> {
    let mut out = String::with_capacity(literal.len());
    let mut rest = literal;
    while let Some(at) = rest.find("&#") {
        out.push_str(&rest[..at]);
        let tail = &rest[at + 2..];
        let end = tail.find(';').ok_or_else(|| {
            PipelineError::XmlParseError("unterminated character reference in entity".to_string())
        })?;
        let digits = &tail[..end];
        let code = match digits.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => digits.parse::<u32>(),
        }
        .ok()
        .and_then(char::from_u32)
        .filter(|&c| is_xml_char(c))
        .ok_or_else(|| {
            PipelineError::XmlParseError(format!("invalid character reference '&#{digits};'"))
        })?;
        out.push(code);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn element_from_start(
    start: &BytesStart<'_>,
    open: &[Element],
    entities: &mut Entities,
) -> PipelineResult<Element> {
    let name = utf8(start.name().as_ref())?.to_string();
    let mut element = Element::new(name);

    for attribute in start.attributes() {
        let attribute = attribute
            .map_err(|e| PipelineError::XmlParseError(format!("invalid attribute: {e}")))?;
        let key = utf8(attribute.key.as_ref())?.to_string();
        let raw = utf8(&attribute.value)?;
        let normalized: String = normalize_line_endings(raw)
            .chars()
            .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
            .collect();
        let value = entities.expand(&normalized, &format!("value for attribute '{key}'"))?;
        element.attributes.push(Attribute { name: key, value });
    }

    check_namespaces(&element, open)?;
    Ok(element)
}

fn check_namespaces(element: &Element, open: &[Element]) -> PipelineResult<()> {
    let is_bound = |prefix: &str| namespace_of(prefix, element, open).is_some();

    for attribute in &element.attributes {
        match attribute.declared_prefix() {
            Some("") => {}
            Some(prefix) if attribute.value.is_empty() => {
                return Err(PipelineError::XmlParseError(format!(
                    "namespace prefix '{prefix}' cannot be bound to an empty URI"
                )));
            }
            Some(_) => {}
            None => {
                if let (Some(prefix), _) = super::split_qname(&attribute.name) {
                    if !is_bound(prefix) {
                        return Err(PipelineError::XmlParseError(format!(
                            "unbound namespace prefix '{prefix}' on attribute '{}'",
                            attribute.name
                        )));
                    }
                }
            }
        }
    }

    // Distinct qualified names may still expand to the same namespace + local name
    let mut expanded = HashSet::new();
    for attribute in element.attributes.iter().filter(|a| !a.is_namespace_declaration()) {
        let (prefix, local) = super::split_qname(&attribute.name);
        let namespace = prefix
            .and_then(|p| namespace_of(p, element, open))
            .unwrap_or("");
        if !expanded.insert((namespace, local)) {
            return Err(PipelineError::XmlParseError(format!(
                "attribute '{}' duplicates {{{namespace}}}{local} on element <{}>",
                attribute.name, element.name
            )));
        }
    }

    if let Some(prefix) = element.prefix() {
        if !is_bound(prefix) {
            return Err(PipelineError::XmlParseError(format!(
                "unbound namespace prefix '{prefix}' on element <{}>",
                element.name
            )));
        }
    }
    Ok(())
}

/// Namespace URI bound to `prefix` at `element`, nearest declaration first
fn namespace_of<'a>(prefix: &str, element: &'a Element, open: &'a [Element]) -> Option<&'a str> {
    if prefix == "xml" {
        return Some(XML_NS);
    }
    std::iter::once(element)
        .chain(open.iter().rev())
        .find_map(|e| {
            e.attributes
                .iter()
                .find(|a| a.declared_prefix() == Some(prefix))
        })
        .map(|a| a.value.as_str())
        .filter(|uri| !uri.is_empty())
}

fn attach(
    node: Node,
    stack: &mut [Element],
    root: &mut Option<Element>,
    prolog: &mut Vec<Node>,
    epilog: &mut Vec<Node>,
) -> PipelineResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        return Ok(());
    }
    match node {
        Node::Element(element) => {
            if root.is_some() {
                return Err(PipelineError::XmlParseError(format!(
                    "multiple root elements: unexpected <{}>",
                    element.name
                )));
            }
            *root = Some(element);
        }
        other if root.is_some() => epilog.push(other),
        other => prolog.push(other),
    }
    Ok(())
}

fn push_text(text: String, stack: &mut [Element]) -> PipelineResult<()> {
    let Some(parent) = stack.last_mut() else {
        if text.chars().all(char::is_whitespace) {
            return Ok(());
        }
        return Err(PipelineError::XmlParseError(
            "text content outside the document element".to_string(),
        ));
    };
    if text.is_empty() {
        return Ok(());
    }
    // Adjacent text and CDATA merge into a single text node
    if let Some(Node::Text(previous)) = parent.children.last_mut() {
        previous.push_str(&text);
    } else {
        parent.children.push(Node::Text(text));
    }
    Ok(())
}

fn utf8(bytes: &[u8]) -> PipelineResult<&str> {
    std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::XmlParseError(format!("invalid UTF-8 in markup: {e}")))
}

fn normalize_line_endings(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}
