use indexmap::IndexMap;
use log::trace;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::err::{XmlError, XmlResult};

/// One XML element as a `(name, attributes, children)` tuple plus its
/// accumulated character data.
///
/// This is the entire intermediate representation between the wire and the
/// typed model: no DOM is built, and the grammar reducer consumes the tree
/// in a single forward pass. The tree never escapes this crate's codec
/// layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleTree {
    pub name: String,
    pub attrs: IndexMap<String, String>,
    pub children: Vec<TupleTree>,
    pub text: String,
}

impl TupleTree {
    fn new(name: String) -> Self {
        TupleTree {
            name,
            attrs: IndexMap::new(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Parse a complete response body into a rooted tuple-tree.
    ///
    /// Rejects, with distinct error kinds: bytes that are not valid UTF-8,
    /// well-formed UTF-8 code points that XML 1.0 forbids, and character
    /// streams that are not well-formed XML.
    pub fn parse(body: &[u8]) -> XmlResult<TupleTree> {
        let text = std::str::from_utf8(body).map_err(|source| XmlError::Utf8 { source })?;
        check_xml_chars(text)?;

        let mut reader = Reader::from_str(text);
        let mut stack: Vec<TupleTree> = Vec::new();
        let mut root: Option<TupleTree> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| syntax_err(e.to_string(), &reader))?;
            match event {
                Event::Start(start) => {
                    let node = start_node(&start, &reader)?;
                    stack.push(node);
                }
                Event::Empty(start) => {
                    let node = start_node(&start, &reader)?;
                    attach(node, &mut stack, &mut root, &reader)?;
                }
                Event::End(_) => {
                    // quick-xml has already verified the end tag matches.
                    let node = stack
                        .pop()
                        .ok_or_else(|| syntax_err("end tag without start tag", &reader))?;
                    attach(node, &mut stack, &mut root, &reader)?;
                }
                Event::Text(text) => {
                    let unescaped = text
                        .unescape()
                        .map_err(|e| syntax_err(e.to_string(), &reader))?;
                    match stack.last_mut() {
                        Some(top) => top.text.push_str(&unescaped),
                        None => {
                            if !unescaped.trim().is_empty() {
                                return Err(syntax_err(
                                    "character data outside the root element",
                                    &reader,
                                ));
                            }
                        }
                    }
                }
                Event::CData(cdata) => {
                    let bytes = cdata.into_inner();
                    let chunk = std::str::from_utf8(&bytes)
                        .map_err(|e| syntax_err(e.to_string(), &reader))?;
                    match stack.last_mut() {
                        Some(top) => top.text.push_str(chunk),
                        None => {
                            return Err(syntax_err(
                                "character data outside the root element",
                                &reader,
                            ));
                        }
                    }
                }
                Event::Eof => break,
                // Declaration, comments, PIs and doctype carry nothing the
                // CIM-XML grammar cares about.
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::Syntax {
                message: "unexpected end of document inside an element".into(),
                offset: reader.buffer_position() as u64,
            });
        }
        let root = root.ok_or(XmlError::Syntax {
            message: "document has no root element".into(),
            offset: 0,
        })?;
        trace!("parsed tuple-tree rooted at {}", root.name);
        Ok(root)
    }
}

fn syntax_err<R>(message: impl Into<String>, reader: &Reader<R>) -> XmlError {
    XmlError::Syntax {
        message: message.into(),
        offset: reader.buffer_position() as u64,
    }
}

fn start_node<R>(
    start: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<R>,
) -> XmlResult<TupleTree> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| syntax_err(e.to_string(), reader))?
        .to_owned();
    let mut node = TupleTree::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| syntax_err(e.to_string(), reader))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| syntax_err(e.to_string(), reader))?
            .to_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| syntax_err(e.to_string(), reader))?
            .into_owned();
        node.attrs.insert(key, value);
    }
    Ok(node)
}

fn attach<R>(
    node: TupleTree,
    stack: &mut Vec<TupleTree>,
    root: &mut Option<TupleTree>,
    reader: &Reader<R>,
) -> XmlResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_some() {
                return Err(syntax_err("more than one root element", reader));
            }
            *root = Some(node);
        }
    }
    Ok(())
}

/// XML 1.0 restricts the character set beyond what UTF-8 allows: most C0
/// controls and the two final noncharacters of the BMP are forbidden even
/// when correctly encoded.
fn check_xml_chars(text: &str) -> XmlResult<()> {
    for (offset, c) in text.char_indices() {
        let ok = matches!(c, '\t' | '\n' | '\r')
            || ('\u{20}'..='\u{D7FF}').contains(&c)
            || ('\u{E000}'..='\u{FFFD}').contains(&c)
            || ('\u{10000}'..='\u{10FFFF}').contains(&c);
        if !ok {
            return Err(XmlError::InvalidXmlChar {
                codepoint: c as u32,
                offset,
            });
        }
    }
    Ok(())
}
