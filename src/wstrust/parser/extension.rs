use crate::wstrust::constants::{elements, ns};
use crate::wstrust::model::{AppliesTo, EndpointReference};
use crate::wstrust::parser::elements::{endpoint_reference, text_element};
use crate::xml::{ElementReader, ParseError, QName, XmlElement};

/// Value produced by an extension parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    AppliesTo(AppliesTo),
    /// Recognized element without a typed slot, kept verbatim
    Element(XmlElement),
}

/// Parser for an element outside the WS-Trust vocabulary
pub trait ExtensionParser: Send + Sync {
    fn supports(&self, name: &QName) -> bool;

    /// Consumes the element, start tag through end tag
    fn parse(&self, reader: &mut ElementReader) -> Result<Extension, ParseError>;
}

/// Lookup table of extension parsers, consulted in registration order
pub struct ExtensionRegistry {
    parsers: Vec<Box<dyn ExtensionParser>>,
}

impl ExtensionRegistry {
    /// A registry without any parser
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    pub fn register(&mut self, parser: impl ExtensionParser + 'static) {
        self.parsers.push(Box::new(parser));
    }

    pub fn lookup(&self, name: &QName) -> Option<&dyn ExtensionParser> {
        self.parsers
            .iter()
            .find(|parser| parser.supports(name))
            .map(Box::as_ref)
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(AppliesToParser);
        registry
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("parsers", &self.parsers.len())
            .finish()
    }
}

/// WS-Policy `AppliesTo`, in both the 2004/09 and the 1.5 namespace
#[derive(Debug, Clone, Copy, Default)]
pub struct AppliesToParser;

impl ExtensionParser for AppliesToParser {
    fn supports(&self, name: &QName) -> bool {
        name.is(ns::WSP, elements::APPLIES_TO) || name.is(ns::WSP_15, elements::APPLIES_TO)
    }

    fn parse(&self, reader: &mut ElementReader) -> Result<Extension, ParseError> {
        reader.next_start_named(elements::APPLIES_TO)?;
        let mut applies_to = AppliesTo::default();
        while let Some(tag) = reader.peek_next_start() {
            let child = tag.local_name().to_string();
            match child.as_str() {
                elements::ENDPOINT_REFERENCE => {
                    applies_to.endpoint_reference = Some(endpoint_reference(reader)?);
                }
                // Some clients omit the endpoint reference wrapper
                elements::ADDRESS => {
                    let address = text_element(reader, elements::ADDRESS)?;
                    applies_to.endpoint_reference = Some(EndpointReference::new(address));
                }
                _ => reader.skip_element()?,
            }
        }
        reader.next_end_named(elements::APPLIES_TO)?;
        Ok(Extension::AppliesTo(applies_to))
    }
}
