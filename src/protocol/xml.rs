//! Minimal XML support for the search/download protocol
//!
//! Documents are written by hand with [`XmlWriter`] and read into a small
//! element tree with `quick-xml`. Only the entities the protocol writes are
//! understood: the five named ones and decimal or hex character references.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fmt::Write as _;

use crate::error::{Result, StudioError};

/// Escape text for an element body or attribute value
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let _ = write!(out, "&#{};", c as u32);
            }
        }
    }
    out
}

/// Inverse of [`escape_xml`]
pub fn unescape_xml(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find(';')
            .ok_or_else(|| StudioError::Xml(format!("unterminated entity in {:?}", text)))?;
        let entity = &after[..end];
        out.push(decode_entity(entity)?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_entity(entity: &str) -> Result<char> {
    let c = match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(decimal) = entity.strip_prefix('#') {
                decimal.parse::<u32>().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
        }
    };
    c.ok_or_else(|| StudioError::Xml(format!("unknown entity &{};", entity)))
}

/// Indented XML output built element by element
#[derive(Debug)]
pub struct XmlWriter {
    out: String,
    open: Vec<String>,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            open: Vec::new(),
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.open.len() {
            self.out.push_str("  ");
        }
    }

    pub fn open(&mut self, name: &str) -> &mut Self {
        self.indent();
        let _ = writeln!(self.out, "<{}>", name);
        self.open.push(name.to_string());
        self
    }

    pub fn close(&mut self) -> &mut Self {
        if let Some(name) = self.open.pop() {
            self.indent();
            let _ = writeln!(self.out, "</{}>", name);
        }
        self
    }

    /// `<name>value</name>` on one line
    pub fn leaf(&mut self, name: &str, value: impl ToString) -> &mut Self {
        self.indent();
        let _ = writeln!(self.out, "<{0}>{1}</{0}>", name, escape_xml(&value.to_string()));
        self
    }

    pub fn leaf_opt(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.leaf(name, value);
        }
        self
    }

    /// Close anything still open and return the document
    pub fn finish(mut self) -> String {
        while !self.open.is_empty() {
            self.close();
        }
        self.out
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Text of a child that must be present
    pub fn required_text(&self, name: &str) -> Result<&str> {
        self.child_text(name)
            .ok_or_else(|| StudioError::Xml(format!("<{}> is missing <{}>", self.name, name)))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Fail unless this element is called `name`
    pub fn expect_name(&self, name: &str) -> Result<&Self> {
        if self.name == name {
            Ok(self)
        } else {
            Err(StudioError::Xml(format!("expected <{}>, found <{}>", name, self.name)))
        }
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| StudioError::Xml(format!("invalid UTF-8: {}", e)))
}

fn start_element(start: &BytesStart) -> Result<XmlElement> {
    let mut element = XmlElement {
        name: utf8(start.name().as_ref())?.to_string(),
        ..XmlElement::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| StudioError::Xml(format!("bad attribute: {}", e)))?;
        let key = utf8(attribute.key.as_ref())?.to_string();
        let value = unescape_xml(utf8(&attribute.value)?)?;
        element.attributes.push((key, value));
    }
    Ok(element)
}

/// Parse a whole document into its root element
pub fn parse_document(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            StudioError::Xml(format!("XML error at position {}: {}", reader.buffer_position(), e))
        })?;
        match event {
            Event::Start(ref e) => stack.push(start_element(e)?),
            Event::Empty(ref e) => {
                let element = start_element(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| StudioError::Xml("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(ref e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&unescape_xml(utf8(e)?)?);
                }
            }
            Event::CData(ref e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(utf8(e)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(StudioError::Xml(format!("unclosed <{}>", stack[stack.len() - 1].name)));
    }
    root.ok_or_else(|| StudioError::Xml("document has no root element".to_string()))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(StudioError::Xml("more than one root element".to_string())),
    }
    Ok(())
}
