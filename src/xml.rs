//! Minimal owned XML tree for preset documents.
//!
//! Preset files are small, so the whole document is read into an
//! [`Element`] tree. Attribute order, comments and processing instructions
//! are kept so that a parsed document written back out lists everything in
//! the same order it was read.

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

use crate::error::{KickError, Result};

/// Line ending used when writing preset documents.
pub const LINE_ENDING: &str = "\r\n";

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// A comment or processing instruction, stored as its inner text.
#[derive(Debug, Clone, PartialEq)]
pub enum Misc {
    Comment(String),
    Instruction(String),
}

/// An XML element with ordered attributes, child elements and optional text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: Option<String>,
    /// Comments and instructions, each with the number of child elements
    /// that precede it. Kept sorted by position.
    pub misc: Vec<(usize, Misc)>,
}

/// A whole document: the root plus whatever surrounds it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub prolog: Vec<Misc>,
    pub root: Element,
    pub epilog: Vec<Misc>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace an attribute value in place, or append it if missing.
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key.to_string(), value)),
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parse a document into its root element.
pub fn parse(input: &str) -> Result<Element> {
    parse_document(input).map(|doc| doc.root)
}

/// Parse a document, keeping comments and instructions outside the root.
pub fn parse_document(input: &str) -> Result<Document> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut prolog = Vec::new();
    let mut epilog = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            KickError::MalformedDocument(format!("{e} at byte {}", reader.error_position()))
        })?;
        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    KickError::MalformedDocument("closing tag without opening tag".into())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| KickError::MalformedDocument(e.to_string()))?;
                push_text(&mut stack, &text);
            }
            Event::CData(data) => {
                let bytes = data.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&bytes));
            }
            Event::Comment(comment) => {
                let misc = Misc::Comment(utf8(&comment)?);
                place_misc(&mut stack, &root, &mut prolog, &mut epilog, misc);
            }
            Event::PI(instruction) => {
                let misc = Misc::Instruction(utf8(&instruction)?);
                place_misc(&mut stack, &root, &mut prolog, &mut epilog, misc);
            }
            Event::Eof => break,
            // The declaration is rewritten on output; doctypes are dropped.
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(KickError::MalformedDocument(format!(
            "unclosed element <{}>",
            open.name
        )));
    }
    let root = root.ok_or_else(|| KickError::MalformedDocument("document has no root element".into()))?;
    Ok(Document { prolog, root, epilog })
}

fn place_misc(stack: &mut [Element], root: &Option<Element>, prolog: &mut Vec<Misc>, epilog: &mut Vec<Misc>, misc: Misc) {
    match stack.last_mut() {
        Some(parent) => parent.misc.push((parent.children.len(), misc)),
        None if root.is_none() => prolog.push(misc),
        None => epilog.push(misc),
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element> {
    let name = utf8(start.name().as_ref())?;
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| KickError::MalformedDocument(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|e| KickError::MalformedDocument(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| KickError::MalformedDocument(e.to_string()))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(KickError::MalformedDocument(format!(
                "second root element <{}>",
                element.name
            )));
        }
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut() {
        top.text.get_or_insert_with(String::new).push_str(text);
    }
}

/// Serialize a root element as a UTF-8 document with CRLF line endings.
pub fn write_document(root: &Element) -> String {
    write_parts(&[], root, &[])
}

impl Document {
    /// The document text: declaration, prolog, root, epilog.
    pub fn write(&self) -> String {
        write_parts(&self.prolog, &self.root, &self.epilog)
    }
}

fn write_parts(prolog: &[Misc], root: &Element, epilog: &[Misc]) -> String {
    let mut out = String::with_capacity(64 * 1024);
    out.push_str(DECLARATION);
    out.push_str(LINE_ENDING);
    for misc in prolog {
        write_misc(&mut out, misc, 0);
    }
    write_element(&mut out, root, 0);
    for misc in epilog {
        write_misc(&mut out, misc, 0);
    }
    out
}

fn write_misc(out: &mut String, misc: &Misc, depth: usize) {
    indent(out, depth);
    match misc {
        Misc::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        Misc::Instruction(text) => {
            out.push_str("<?");
            out.push_str(text);
            out.push_str("?>");
        }
    }
    out.push_str(LINE_ENDING);
}

fn write_element(out: &mut String, element: &Element, depth: usize) {
    indent(out, depth);
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }

    let no_body = element.children.is_empty() && element.misc.is_empty();
    match (&element.text, no_body) {
        (None, true) => {
            out.push_str("/>");
            out.push_str(LINE_ENDING);
        }
        (Some(text), true) => {
            out.push('>');
            out.push_str(&escape(text.as_str()));
            close(out, &element.name);
        }
        (text, false) => {
            out.push('>');
            out.push_str(LINE_ENDING);
            if let Some(text) = text {
                indent(out, depth + 1);
                out.push_str(&escape(text.as_str()));
                out.push_str(LINE_ENDING);
            }
            let mut misc = element.misc.iter().peekable();
            for (i, child) in element.children.iter().enumerate() {
                while let Some((_, m)) = misc.next_if(|(at, _)| *at <= i) {
                    write_misc(out, m, depth + 1);
                }
                write_element(out, child, depth + 1);
            }
            for (_, m) in misc {
                write_misc(out, m, depth + 1);
            }
            indent(out, depth);
            close(out, &element.name);
        }
    }
}

fn close(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
    out.push_str(LINE_ENDING);
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}
