//! XML header codec: grammar-level parse and emit of the XISF header.
//!
//! `quick-xml` drives the character-level work; a minimal DOM sits between
//! it and the data model so the mapping code in [`parse`] and [`emit`] reads
//! element-by-element. Element lookup is by local name — the root's
//! namespace is validated once, then prefixes are ignored.

use crate::error::{Error, Result};

mod emit;
mod parse;

pub(crate) use emit::emit_header;
pub(crate) use parse::parse_header;

/// The XISF 1.0 XML namespace.
pub const XISF_NAMESPACE: &str = "http://www.pixinsight.com/xisf";

/// Advisory schema location emitted on the root element.
pub(crate) const XISF_SCHEMA_LOCATION: &str =
    "http://www.pixinsight.com/xisf http://pixinsight.com/xisf/xisf-1.0.xsd";

// ── Minimal DOM ───────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct XmlElement {
    /// Local name, prefix stripped.
    pub name: String,
    /// Namespace prefix, kept only for root-namespace validation.
    pub prefix: Option<String>,
    /// Attribute keys exactly as written (including `xmlns` declarations).
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require_attr(&self, key: &'static str, element: &'static str) -> Result<&str> {
        self.attr(key).ok_or(Error::MissingRequiredAttribute {
            element,
            attribute: key,
        })
    }

    /// Concatenated text content of direct text children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            if let XmlNode::Text(t) = child {
                out.push_str(t);
            }
        }
        out
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements().filter(move |e| e.name == name)
    }

    pub fn push_element(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(XmlNode::Text(text.into()));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct XmlDocument {
    /// XML comment preceding the root element.
    pub initial_comment: Option<String>,
    pub root: XmlElement,
}

// ── Character-level parse ─────────────────────────────────────────────────────

/// Parse a UTF-8 XML document into the minimal DOM.
///
/// Whitespace-only text nodes (indentation) are dropped; all other text is
/// kept verbatim. Only the first comment before the root element is retained.
pub(crate) fn parse_document(xml: &str) -> Result<XmlDocument> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut initial_comment: Option<String> = None;
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Decl(_) | Event::DocType(_) | Event::PI(_) => {}
            Event::Comment(t) => {
                if root.is_none() && stack.is_empty() && initial_comment.is_none() {
                    initial_comment =
                        Some(String::from_utf8_lossy(t.as_ref()).into_owned());
                }
            }
            Event::Start(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(Error::MalformedXml("content after root element".into()));
                }
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::MalformedXml("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::MalformedXml(e.to_string()))?;
                if let Some(parent) = stack.last_mut() {
                    if !text.chars().all(|c| c.is_whitespace()) {
                        parent.push_text(text.into_owned());
                    }
                } else if !text.chars().all(|c| c.is_whitespace()) {
                    return Err(Error::MalformedXml("text outside the root element".into()));
                }
            }
            Event::CData(t) => {
                if let Some(parent) = stack.last_mut() {
                    parent.push_text(String::from_utf8_lossy(t.as_ref()).into_owned());
                }
            }
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(Error::MalformedXml("unclosed element".into()));
    }
    let root = root.ok_or_else(|| Error::MalformedXml("document has no root element".into()))?;
    Ok(XmlDocument {
        initial_comment,
        root,
    })
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<XmlElement> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let prefix = start
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned());

    let mut element = XmlElement {
        name,
        prefix,
        ..XmlElement::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::MalformedXml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::MalformedXml(e.to_string()))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push_element(element);
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(Error::MalformedXml("multiple root elements".into()));
            }
            *root = Some(element);
            Ok(())
        }
    }
}

// ── Character-level emit ──────────────────────────────────────────────────────

/// Serialize a document as UTF-8 without a BOM, declaration included.
/// Pretty printing indents two spaces per level; elements carrying text keep
/// their content on one line so payload text stays byte-exact.
pub(crate) fn serialize_document(doc: &XmlDocument, pretty: bool) -> Vec<u8> {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    newline(&mut out, pretty);
    if let Some(comment) = &doc.initial_comment {
        out.push_str("<!--");
        out.push_str(comment);
        out.push_str("-->");
        newline(&mut out, pretty);
    }
    write_element(&mut out, &doc.root, 0, pretty);
    if pretty {
        out.push('\n');
    }
    out.into_bytes()
}

fn newline(out: &mut String, pretty: bool) {
    if pretty {
        out.push('\n');
    }
}

fn indent(out: &mut String, depth: usize, pretty: bool) {
    if pretty {
        for _ in 0..depth {
            out.push_str("  ");
        }
    }
}

fn write_element(out: &mut String, element: &XmlElement, depth: usize, pretty: bool) {
    use quick_xml::escape::{escape, partial_escape};

    indent(out, depth, pretty);
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }

    let has_text = element
        .children
        .iter()
        .any(|c| matches!(c, XmlNode::Text(_)));
    out.push('>');

    if has_text {
        // Keep payload-bearing elements on one line.
        for child in &element.children {
            match child {
                XmlNode::Text(t) => out.push_str(&partial_escape(t.as_str())),
                XmlNode::Element(e) => write_element(out, e, 0, false),
            }
        }
    } else {
        for child in &element.children {
            if let XmlNode::Element(e) = child {
                newline(out, pretty);
                write_element(out, e, depth + 1, pretty);
            }
        }
        newline(out, pretty);
        indent(out, depth, pretty);
    }

    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_and_attributes() {
        let doc = parse_document(
            r#"<?xml version="1.0"?><a x="1"><b y="2">text</b><c/></a>"#,
        )
        .unwrap();
        assert_eq!(doc.root.name, "a");
        assert_eq!(doc.root.attr("x"), Some("1"));
        let b = doc.root.children_named("b").next().unwrap();
        assert_eq!(b.attr("y"), Some("2"));
        assert_eq!(b.text(), "text");
        assert_eq!(doc.root.child_elements().count(), 2);
    }

    #[test]
    fn keeps_leading_comment_only() {
        let doc = parse_document("<!-- session notes --><a><!-- inner --></a>").unwrap();
        assert_eq!(doc.initial_comment.as_deref(), Some(" session notes "));
    }

    #[test]
    fn strips_prefixes_but_remembers_root_prefix() {
        let doc =
            parse_document(r#"<x:a xmlns:x="urn:demo"><x:b/></x:a>"#).unwrap();
        assert_eq!(doc.root.name, "a");
        assert_eq!(doc.root.prefix.as_deref(), Some("x"));
        assert_eq!(doc.root.child_elements().next().unwrap().name, "b");
    }

    #[test]
    fn unescapes_attribute_and_text_content() {
        let doc = parse_document(r#"<a note="x &lt; y">1 &amp; 2</a>"#).unwrap();
        assert_eq!(doc.root.attr("note"), Some("x < y"));
        assert_eq!(doc.root.text(), "1 & 2");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("").is_err());
        assert!(parse_document("<a/><b/>").is_err());
    }

    #[test]
    fn serialize_escapes_and_roundtrips() {
        let mut root = XmlElement::new("a");
        root.set_attr("note", "x < y & \"z\"");
        root.push_text("1 & 2");
        let doc = XmlDocument {
            initial_comment: Some(" hello ".into()),
            root,
        };
        let bytes = serialize_document(&doc, false);
        let reparsed = parse_document(std::str::from_utf8(&bytes).unwrap()).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn pretty_print_indents_but_keeps_text_inline() {
        let mut inner = XmlElement::new("data");
        inner.push_text("AAAA");
        let mut root = XmlElement::new("root");
        root.push_element(inner);
        let doc = XmlDocument {
            initial_comment: None,
            root,
        };
        let text = String::from_utf8(serialize_document(&doc, true)).unwrap();
        assert!(text.contains("\n  <data>AAAA</data>"));
    }

    #[test]
    fn serialization_is_deterministic() {
        let mut root = XmlElement::new("root");
        root.set_attr("k", "v");
        let doc = XmlDocument {
            initial_comment: None,
            root,
        };
        assert_eq!(
            serialize_document(&doc, true),
            serialize_document(&doc, true)
        );
    }
}
