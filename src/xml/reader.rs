use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{PrefixDeclaration, ResolveResult};

use crate::xml::{Attribute, Node, ParseError, QName, XmlElement};

/// A start tag with resolved names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    pub name: QName,
    pub prefix: Option<String>,
    pub attributes: Vec<Attribute>,
    pub namespaces: Vec<(Option<String>, String)>,
}

impl StartTag {
    /// Value of an unqualified attribute
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is("", name))
            .map(|a| a.value.as_str())
    }

    pub fn local_name(&self) -> &str {
        self.name.local_name()
    }
}

/// Lexical XML event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Start(StartTag),
    End(QName),
    Text(String),
}

/// Cursor over the events of one XML document.
///
/// The document is lexed up front so that lookahead is free. Structural
/// operations skip interleaving text; `element_text` reads it.
#[derive(Debug, Clone)]
pub struct ElementReader {
    events: Vec<XmlEvent>,
    position: usize,
    open: Vec<QName>,
}

impl ElementReader {
    /// Lexes the document. Fails on malformed XML or unbound prefixes.
    pub fn new(xml: &str) -> Result<Self, ParseError> {
        Ok(Self::from_events(lex(xml)?))
    }

    /// Replays an already materialized element
    pub fn from_element(element: &XmlElement) -> Self {
        let mut events = Vec::new();
        flatten(element, &mut events);
        Self::from_events(events)
    }

    fn from_events(events: Vec<XmlEvent>) -> Self {
        Self {
            events,
            position: 0,
            open: Vec::new(),
        }
    }

    /// Returns true once every event has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.structural_index().is_none()
    }

    /// Next start or end event, skipping text
    pub fn peek(&self) -> Option<&XmlEvent> {
        self.structural_index().map(|idx| &self.events[idx])
    }

    /// Next start tag without consuming it. `None` if an end tag comes first.
    pub fn peek_next_start(&self) -> Option<&StartTag> {
        match self.peek() {
            Some(XmlEvent::Start(tag)) => Some(tag),
            _ => None,
        }
    }

    /// Consumes through the next start tag
    pub fn next_start(&mut self) -> Result<StartTag, ParseError> {
        let idx = self.structural_index().ok_or(ParseError::UnexpectedEof)?;
        match &self.events[idx] {
            XmlEvent::Start(tag) => {
                let tag = tag.clone();
                self.position = idx + 1;
                self.open.push(tag.name.clone());
                Ok(tag)
            }
            other => Err(ParseError::ExpectedStart(describe(other))),
        }
    }

    /// Consumes the next start tag and checks its local name
    pub fn next_start_named(&mut self, local_name: &str) -> Result<StartTag, ParseError> {
        let found = self
            .peek_next_start()
            .map(|tag| tag.local_name().to_string());
        match found {
            Some(name) if name == local_name => self.next_start(),
            Some(name) => Err(ParseError::UnexpectedElement {
                expected: local_name.to_string(),
                found: name,
            }),
            None => self.next_start(),
        }
    }

    /// Consumes through the next end tag
    pub fn next_end(&mut self) -> Result<QName, ParseError> {
        let idx = self.structural_index().ok_or(ParseError::UnexpectedEof)?;
        match &self.events[idx] {
            XmlEvent::End(name) => {
                let name = name.clone();
                self.position = idx + 1;
                self.open.pop();
                Ok(name)
            }
            other => Err(ParseError::ExpectedEnd(describe(other))),
        }
    }

    /// Consumes the next end tag and checks its local name
    pub fn next_end_named(&mut self, local_name: &str) -> Result<(), ParseError> {
        let name = self.next_end()?;
        if name.local_name() != local_name {
            return Err(ParseError::UnexpectedElement {
                expected: format!("/{local_name}"),
                found: format!("/{}", name.local_name()),
            });
        }
        Ok(())
    }

    /// Whether the very next event is text
    pub fn has_text(&self) -> bool {
        matches!(self.events.get(self.position), Some(XmlEvent::Text(_)))
    }

    /// Reads the text of the element whose start tag was just consumed,
    /// including its end tag.
    pub fn element_text(&mut self) -> Result<String, ParseError> {
        let element = self
            .open
            .last()
            .map(|name| name.local_name().to_string())
            .unwrap_or_default();

        if !self.has_text() {
            return Err(ParseError::ExpectedTextValue(element));
        }

        let mut text = String::new();
        while let Some(XmlEvent::Text(chunk)) = self.events.get(self.position) {
            text.push_str(chunk);
            self.position += 1;
        }

        match self.events.get(self.position) {
            Some(XmlEvent::End(_)) => {
                self.position += 1;
                self.open.pop();
                Ok(text)
            }
            Some(other) => Err(ParseError::ExpectedEnd(describe(other))),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// Materializes the next element and all of its descendants
    pub fn raw_subtree(&mut self) -> Result<XmlElement, ParseError> {
        let idx = self.structural_index().ok_or(ParseError::UnexpectedEof)?;
        let XmlEvent::Start(tag) = &self.events[idx] else {
            return Err(ParseError::ExpectedStart(describe(&self.events[idx])));
        };

        let mut stack = vec![element_from(tag)];
        let mut cursor = idx + 1;
        while let Some(event) = self.events.get(cursor) {
            cursor += 1;
            match event {
                XmlEvent::Start(tag) => stack.push(element_from(tag)),
                XmlEvent::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.push_text(text.clone());
                    }
                }
                XmlEvent::End(_) => {
                    let Some(done) = stack.pop() else {
                        break;
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.push_child(done),
                        None => {
                            self.position = cursor;
                            return Ok(done);
                        }
                    }
                }
            }
        }
        Err(ParseError::UnexpectedEof)
    }

    /// Skips the next element and its descendants
    pub fn skip_element(&mut self) -> Result<(), ParseError> {
        self.raw_subtree().map(|_| ())
    }

    fn structural_index(&self) -> Option<usize> {
        self.events[self.position.min(self.events.len())..]
            .iter()
            .position(|event| !matches!(event, XmlEvent::Text(_)))
            .map(|offset| self.position + offset)
    }
}

fn describe(event: &XmlEvent) -> String {
    match event {
        XmlEvent::Start(tag) => format!("<{}>", tag.name.local_name()),
        XmlEvent::End(name) => format!("</{}>", name.local_name()),
        XmlEvent::Text(_) => "text".to_string(),
    }
}

fn element_from(tag: &StartTag) -> XmlElement {
    XmlElement::from_parts(
        tag.name.clone(),
        tag.prefix.clone(),
        tag.attributes.clone(),
        tag.namespaces.clone(),
    )
}

fn flatten(element: &XmlElement, events: &mut Vec<XmlEvent>) {
    events.push(XmlEvent::Start(StartTag {
        name: element.name().clone(),
        prefix: element.prefix().map(str::to_string),
        attributes: element.attributes().to_vec(),
        namespaces: element.namespaces().to_vec(),
    }));
    for node in element.nodes() {
        match node {
            Node::Element(child) => flatten(child, events),
            Node::Text(text) => events.push(XmlEvent::Text(text.clone())),
        }
    }
    events.push(XmlEvent::End(element.name().clone()));
}

fn lex(xml: &str) -> Result<Vec<XmlEvent>, ParseError> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut events = Vec::new();
    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        let namespace = resolved_namespace(resolved)?;
        match event {
            Event::Start(e) => {
                let tag = start_tag(&reader, &e, namespace)?;
                events.push(XmlEvent::Start(tag));
            }
            Event::End(e) => {
                let local = std::str::from_utf8(e.local_name().as_ref())?.to_string();
                events.push(XmlEvent::End(QName::new(namespace, local)));
            }
            Event::Text(e) => push_text(&mut events, e.unescape()?.into_owned()),
            Event::CData(e) => {
                let text = std::str::from_utf8(&e.into_inner())?.to_string();
                push_text(&mut events, text);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(events)
}

fn push_text(events: &mut Vec<XmlEvent>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(XmlEvent::Text(previous)) = events.last_mut() {
        previous.push_str(&text);
    } else {
        events.push(XmlEvent::Text(text));
    }
}

fn resolved_namespace(resolved: ResolveResult<'_>) -> Result<String, ParseError> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(std::str::from_utf8(ns.as_ref())?.to_string()),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(ParseError::UnboundPrefix(
            String::from_utf8_lossy(&prefix).into_owned(),
        )),
    }
}

fn start_tag(
    reader: &NsReader<&[u8]>,
    e: &BytesStart<'_>,
    namespace: String,
) -> Result<StartTag, ParseError> {
    let local = std::str::from_utf8(e.local_name().as_ref())?.to_string();
    let prefix = match e.name().prefix() {
        Some(p) => Some(std::str::from_utf8(p.as_ref())?.to_string()),
        None => None,
    };

    let mut attributes = Vec::new();
    let mut namespaces = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        if let Some(binding) = attr.key.as_namespace_binding() {
            let declared = match binding {
                PrefixDeclaration::Default => None,
                PrefixDeclaration::Named(p) => Some(std::str::from_utf8(p)?.to_string()),
            };
            namespaces.push((declared, value));
            continue;
        }

        let (resolved, attr_local) = reader.resolve_attribute(attr.key);
        let attr_namespace = resolved_namespace(resolved)?;
        let attr_local = std::str::from_utf8(attr_local.as_ref())?.to_string();
        let attr_prefix = match attr.key.prefix() {
            Some(p) => Some(std::str::from_utf8(p.as_ref())?.to_string()),
            None => None,
        };
        attributes.push(Attribute {
            name: QName::new(attr_namespace, attr_local),
            prefix: attr_prefix,
            value,
        });
    }

    Ok(StartTag {
        name: QName::new(namespace, local),
        prefix,
        attributes,
        namespaces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
        <a:Root xmlns:a="urn:a" xmlns:b="urn:b" Context="ctx">
            <a:Value>42</a:Value>
            <b:Opaque b:Id="x"><b:Inner>text &amp; more</b:Inner></b:Opaque>
            <a:Empty/>
        </a:Root>"#;

    #[test]
    fn test_peek_does_not_consume() {
        let mut reader = ElementReader::new(DOC).unwrap();
        assert_eq!(reader.peek_next_start().unwrap().local_name(), "Root");
        assert_eq!(reader.peek_next_start().unwrap().local_name(), "Root");

        let root = reader.next_start().unwrap();
        assert_eq!(root.name, QName::new("urn:a", "Root"));
        assert_eq!(root.attribute("Context"), Some("ctx"));
        assert_eq!(reader.peek_next_start().unwrap().local_name(), "Value");
    }

    #[test]
    fn test_element_text_and_subtree() {
        let mut reader = ElementReader::new(DOC).unwrap();
        reader.next_start_named("Root").unwrap();

        reader.next_start_named("Value").unwrap();
        assert!(reader.has_text());
        assert_eq!(reader.element_text().unwrap(), "42");

        let opaque = reader.raw_subtree().unwrap();
        assert_eq!(opaque.name(), &QName::new("urn:b", "Opaque"));
        assert_eq!(opaque.attribute_ns("urn:b", "Id"), Some("x"));
        assert_eq!(
            opaque.child("urn:b", "Inner").map(XmlElement::text).as_deref(),
            Some("text & more")
        );

        reader.next_start_named("Empty").unwrap();
        assert!(!reader.has_text());
        assert!(matches!(
            reader.element_text(),
            Err(ParseError::ExpectedTextValue(name)) if name == "Empty"
        ));
        reader.next_end_named("Empty").unwrap();
        reader.next_end_named("Root").unwrap();
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_mismatched_expectations() {
        let mut reader = ElementReader::new(DOC).unwrap();
        assert!(matches!(
            reader.next_end(),
            Err(ParseError::ExpectedEnd(found)) if found == "<Root>"
        ));
        assert!(matches!(
            reader.next_start_named("Other"),
            Err(ParseError::UnexpectedElement { .. })
        ));
    }

    #[test]
    fn test_exhausted_reader_fails() {
        let mut reader = ElementReader::new("<a/>").unwrap();
        reader.next_start().unwrap();
        reader.next_end().unwrap();
        assert!(matches!(reader.next_start(), Err(ParseError::UnexpectedEof)));
        assert!(reader.peek().is_none());
    }

    #[test]
    fn test_unbound_prefix_is_rejected() {
        assert!(matches!(
            ElementReader::new("<x:a/>"),
            Err(ParseError::UnboundPrefix(_)) | Err(ParseError::Xml(_))
        ));
    }

    #[test]
    fn test_replay_detached_subtree() {
        let mut reader = ElementReader::new(DOC).unwrap();
        reader.next_start().unwrap();
        reader.skip_element().unwrap();
        let opaque = reader.raw_subtree().unwrap();

        let xml = opaque.to_xml().unwrap();
        assert!(xml.starts_with(r#"<b:Opaque xmlns:b="urn:b" b:Id="x">"#));

        let mut replay = ElementReader::from_element(&opaque);
        replay.next_start_named("Opaque").unwrap();
        replay.next_start_named("Inner").unwrap();
        assert_eq!(replay.element_text().unwrap(), "text & more");
        replay.next_end_named("Opaque").unwrap();
        assert!(replay.is_exhausted());
    }
}
