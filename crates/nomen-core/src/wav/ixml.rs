//! iXML chunk codec
//!
//! The `iXML` chunk is UTF-8 XML rooted at `<BWFXML>`. The writer owns two
//! sub-blocks: `<USER>` (ALL-CAPS tags, authoritative) and `<ASWG>`
//! (camelCase tags, secondary). Everything else in the document
//! (`<PROJECT>`, `<TRACK_LIST>`, vendor blocks) is held in an element tree
//! and re-serialized untouched, so foreign metadata survives every save.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;

use crate::error::{CoreError, CoreResult};
use crate::types::MetadataFields;

use super::fields::{
    self, builtin_user_tags, CONTENT_TYPE_TAG, CONTENT_TYPE_VALUE, EMBEDDER_TAG, EMBEDDER_VALUE,
};

const ROOT_TAG: &str = "BWFXML";
const USER_TAG: &str = "USER";
const ASWG_TAG: &str = "ASWG";
const IXML_VERSION_TAG: &str = "IXML_VERSION";
const IXML_VERSION_VALUE: &str = "1.61";

/// One node of the preserved document tree
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

/// An element with its attributes and children, in document order
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Child element by name, appended at the end of this block if absent
    fn child_mut_or_insert(&mut self, name: &str) -> &mut XmlElement {
        if self.child(name).is_none() {
            self.children
                .push(XmlNode::Element(XmlElement::new(name.to_string())));
        }
        self.child_mut(name).expect("child just inserted")
    }

    /// Concatenated text content
    fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace this element's content with a single text value
    fn set_text(&mut self, value: &str) {
        self.children.clear();
        self.children.push(XmlNode::Text(value.to_string()));
    }

    /// Element child names in document order
    fn element_children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }
}

/// Decode chunk bytes to a string: UTF-8 first, latin-1 fallback.
///
/// iXML writers in the wild occasionally emit latin-1; every byte is a
/// valid latin-1 code point, so the fallback cannot fail.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            log::warn!("iXML chunk is not valid UTF-8, reading as latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

/// Parse an iXML chunk payload into a document tree.
///
/// Returns the root element; a document whose root is not `<BWFXML>` is
/// still returned (callers decide whether to tolerate it).
pub fn parse_document(bytes: &[u8]) -> Result<XmlElement, String> {
    let text = decode_text(bytes);
    let mut reader = Reader::from_str(&text);

    // Stack of open elements; a sentinel at the bottom collects top-level
    // nodes so the first real element becomes the root.
    let mut stack: Vec<XmlElement> = vec![XmlElement::new("")];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push(element_from_start(&start)?);
            }
            Ok(Event::Empty(start)) => {
                let el = element_from_start(&start)?;
                push_child(&mut stack, XmlNode::Element(el));
            }
            Ok(Event::End(_)) => {
                let el = stack.pop().ok_or("unbalanced end tag")?;
                push_child(&mut stack, XmlNode::Element(el));
            }
            Ok(Event::Text(text)) => {
                let value = text.unescape().map_err(|e| e.to_string())?.into_owned();
                push_child(&mut stack, XmlNode::Text(value));
            }
            Ok(Event::CData(cdata)) => {
                let value = String::from_utf8_lossy(cdata.as_ref()).into_owned();
                push_child(&mut stack, XmlNode::Text(value));
            }
            Ok(Event::Comment(comment)) => {
                let value = String::from_utf8_lossy(comment.as_ref()).into_owned();
                push_child(&mut stack, XmlNode::Comment(value));
            }
            Ok(Event::Decl(_) | Event::PI(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
        }
    }

    if stack.len() != 1 {
        return Err("unclosed element at end of document".to_string());
    }
    let sentinel = stack.pop().expect("sentinel");
    sentinel
        .children
        .into_iter()
        .find_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
        .ok_or_else(|| "document has no root element".to_string())
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut el = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn push_child(stack: &mut [XmlElement], node: XmlNode) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    }
}

/// Serialize a document tree to UTF-8 bytes with an XML declaration
pub fn serialize(root: &XmlElement) -> Vec<u8> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("in-memory write");
    write_element(&mut writer, root);
    writer.into_inner()
}

fn write_element(writer: &mut Writer<Vec<u8>>, el: &XmlElement) {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer
        .write_event(Event::Start(start))
        .expect("in-memory write");
    for child in &el.children {
        match child {
            XmlNode::Element(child_el) => write_element(writer, child_el),
            XmlNode::Text(text) => {
                writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .expect("in-memory write");
            }
            XmlNode::Comment(comment) => {
                writer
                    .write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))
                    .expect("in-memory write");
            }
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(el.name.as_str())))
        .expect("in-memory write");
}

/// A fresh `<BWFXML>` document with the mandatory header field
pub fn new_document() -> XmlElement {
    let mut root = XmlElement::new(ROOT_TAG);
    let mut version = XmlElement::new(IXML_VERSION_TAG);
    version.set_text(IXML_VERSION_VALUE);
    root.children.push(XmlNode::Element(version));
    root
}

/// Read the working metadata set out of a document.
///
/// ASWG is read first, then USER on top; USER wins where both carry a
/// field. `<USER>` children outside the built-in tag set land in
/// `custom_fields` under their raw tag names.
pub fn read_fields(root: &XmlElement) -> (MetadataFields, BTreeMap<String, String>) {
    let mut metadata = MetadataFields::default();
    let mut custom_fields = BTreeMap::new();

    if let Some(aswg) = root.child(ASWG_TAG) {
        for el in aswg.element_children() {
            if let Some(field) = fields::field_for_aswg_tag(&el.name) {
                let value = el.text().trim().to_string();
                if !value.is_empty() {
                    metadata.set(field, Some(value));
                }
            }
        }
    }

    let builtin = builtin_user_tags();
    if let Some(user) = root.child(USER_TAG) {
        for el in user.element_children() {
            let value = el.text().trim().to_string();
            if let Some(field) = fields::field_for_user_tag(&el.name) {
                if !value.is_empty() {
                    metadata.set(field, Some(value));
                }
            } else if !builtin.contains(el.name.as_str()) {
                custom_fields.insert(el.name.clone(), value);
            }
        }
    }

    (metadata, custom_fields)
}

fn custom_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Z0-9_]{1,32}$").expect("valid regex"))
}

/// Validate a user-defined USER tag name
pub fn validate_custom_tag(tag: &str) -> CoreResult<()> {
    if !custom_tag_regex().is_match(tag) {
        return Err(CoreError::Validation(format!(
            "custom field tag {tag:?} must match [A-Z0-9_]{{1,32}}"
        )));
    }
    if builtin_user_tags().contains(tag) {
        return Err(CoreError::Validation(format!(
            "custom field tag {tag:?} collides with a built-in tag"
        )));
    }
    Ok(())
}

/// Merge the edited record into a document tree.
///
/// Every present built-in field is written to both its USER and ASWG tags
/// (USER is the source of truth, ASWG is synchronized to it). Existing
/// sibling order is preserved; new elements append at the end of their
/// block. Custom fields are validated before anything is mutated.
pub fn merge(
    root: &mut XmlElement,
    metadata: &MetadataFields,
    custom_fields: &BTreeMap<String, String>,
) -> CoreResult<()> {
    for tag in custom_fields.keys() {
        validate_custom_tag(tag)?;
    }

    {
        let user = root.child_mut_or_insert(USER_TAG);
        for mapping in fields::FIELD_MAPPINGS {
            let (Some(tag), Some(value)) = (mapping.user_tag, metadata.get(mapping.field)) else {
                continue;
            };
            user.child_mut_or_insert(tag).set_text(value);
        }
        for (tag, value) in custom_fields {
            user.child_mut_or_insert(tag).set_text(value);
        }
        user.child_mut_or_insert(EMBEDDER_TAG).set_text(EMBEDDER_VALUE);
    }

    {
        let aswg = root.child_mut_or_insert(ASWG_TAG);
        for mapping in fields::FIELD_MAPPINGS {
            let (Some(tag), Some(value)) = (mapping.aswg_tag, metadata.get(mapping.field)) else {
                continue;
            };
            aswg.child_mut_or_insert(tag).set_text(value);
        }
        aswg.child_mut_or_insert(CONTENT_TYPE_TAG)
            .set_text(CONTENT_TYPE_VALUE);
    }

    Ok(())
}
