//! Parsing of WS-Trust messages into the typed model.

mod elements;
mod extension;
mod message;

use std::sync::Arc;

pub use extension::{AppliesToParser, Extension, ExtensionParser, ExtensionRegistry};

use crate::wstrust::constants::{BASE_NAMESPACE, elements as names};
use crate::wstrust::model::{
    RequestSecurityTokenCollection, RequestSecurityTokenResponseCollection, WsTrustMessage,
};
use crate::xml::{ElementReader, ParseError, XmlElement};
use message::{MessageKind, parse_message};

/// Entry point for RST, RSTR and their collections
#[derive(Debug, Default)]
pub struct WsTrustParser {
    extensions: ExtensionRegistry,
}

impl WsTrustParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom extension registry instead of the built-in one
    pub fn with_extensions(extensions: ExtensionRegistry) -> Self {
        Self { extensions }
    }

    pub fn extensions_mut(&mut self) -> &mut ExtensionRegistry {
        &mut self.extensions
    }

    /// Parses the message starting at the next start tag of `reader`
    pub fn parse(&self, reader: &mut ElementReader) -> Result<WsTrustMessage, ParseError> {
        let name = match reader.peek_next_start() {
            Some(tag) => tag.name.clone(),
            None if reader.is_exhausted() => return Err(ParseError::UnexpectedEof),
            None => return Err(ParseError::ExpectedStart("end element".to_string())),
        };
        if name.namespace() != BASE_NAMESPACE {
            return Err(ParseError::UnknownTag(name.to_string()));
        }

        let message = match name.local_name() {
            names::RST_COLLECTION => {
                WsTrustMessage::RequestCollection(self.request_collection(reader)?)
            }
            names::RST => WsTrustMessage::Request(
                parse_message(reader, MessageKind::Request, &self.extensions)?.into_request(),
            ),
            names::RSTR_COLLECTION => {
                WsTrustMessage::ResponseCollection(self.response_collection(reader)?)
            }
            names::RSTR => WsTrustMessage::Response(
                parse_message(reader, MessageKind::Response, &self.extensions)?.into_response(),
            ),
            _ => return Err(ParseError::UnknownTag(name.to_string())),
        };
        Ok(message)
    }

    pub fn parse_str(&self, xml: &str) -> Result<WsTrustMessage, ParseError> {
        let mut reader = ElementReader::new(xml)?;
        self.parse(&mut reader)
    }

    /// Parses a materialized element and records it as the source document
    /// of every request it contains
    pub fn parse_element(&self, element: &XmlElement) -> Result<WsTrustMessage, ParseError> {
        let mut reader = ElementReader::from_element(element);
        let mut message = self.parse(&mut reader)?;

        let source = Arc::new(element.clone());
        match &mut message {
            WsTrustMessage::Request(request) => request.source = Some(source),
            WsTrustMessage::RequestCollection(collection) => {
                for request in &mut collection.requests {
                    request.source = Some(Arc::clone(&source));
                }
            }
            WsTrustMessage::Response(_) | WsTrustMessage::ResponseCollection(_) => {}
        }
        Ok(message)
    }

    fn request_collection(
        &self,
        reader: &mut ElementReader,
    ) -> Result<RequestSecurityTokenCollection, ParseError> {
        reader.next_start_named(names::RST_COLLECTION)?;
        let mut requests = Vec::new();
        while let Some(tag) = reader.peek_next_start() {
            if !tag.name.is(BASE_NAMESPACE, names::RST) {
                return Err(ParseError::UnknownTag(tag.name.to_string()));
            }
            requests.push(
                parse_message(reader, MessageKind::Request, &self.extensions)?.into_request(),
            );
        }
        reader.next_end_named(names::RST_COLLECTION)?;
        Ok(RequestSecurityTokenCollection { requests })
    }

    fn response_collection(
        &self,
        reader: &mut ElementReader,
    ) -> Result<RequestSecurityTokenResponseCollection, ParseError> {
        reader.next_start_named(names::RSTR_COLLECTION)?;
        let mut responses = Vec::new();
        while let Some(tag) = reader.peek_next_start() {
            if !tag.name.is(BASE_NAMESPACE, names::RSTR) {
                return Err(ParseError::UnknownTag(tag.name.to_string()));
            }
            responses.push(
                parse_message(reader, MessageKind::Response, &self.extensions)?.into_response(),
            );
        }
        reader.next_end_named(names::RSTR_COLLECTION)?;
        Ok(RequestSecurityTokenResponseCollection { responses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wstrust::model::{KeyType, RequestType, RequestedProofToken, TokenTarget};

    const WST: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";

    #[test]
    fn test_dispatch_on_root_element() {
        let parser = WsTrustParser::new();

        let rst = format!(r#"<wst:RequestSecurityToken xmlns:wst="{WST}"/>"#);
        assert!(matches!(parser.parse_str(&rst).unwrap(), WsTrustMessage::Request(_)));

        let rstr = format!(r#"<wst:RequestSecurityTokenResponse xmlns:wst="{WST}"/>"#);
        assert!(matches!(parser.parse_str(&rstr).unwrap(), WsTrustMessage::Response(_)));

        let other = format!(r#"<wst:Envelope xmlns:wst="{WST}"/>"#);
        assert!(matches!(parser.parse_str(&other), Err(ParseError::UnknownTag(_))));

        let foreign = r#"<RequestSecurityToken xmlns="urn:not-trust"/>"#;
        assert!(matches!(parser.parse_str(foreign), Err(ParseError::UnknownTag(_))));
    }

    #[test]
    fn test_batch_collection_keeps_order() {
        let xml = format!(
            r#"<wst:RequestSecurityTokenCollection xmlns:wst="{WST}">
                 <wst:RequestSecurityToken Context="a"><wst:RequestType>{WST}/BatchIssue</wst:RequestType></wst:RequestSecurityToken>
                 <wst:RequestSecurityToken Context="b"><wst:RequestType>{WST}/BatchIssue</wst:RequestType></wst:RequestSecurityToken>
               </wst:RequestSecurityTokenCollection>"#
        );
        let WsTrustMessage::RequestCollection(collection) = WsTrustParser::new().parse_str(&xml).unwrap()
        else {
            panic!("expected a request collection");
        };
        let contexts: Vec<_> = collection
            .requests
            .iter()
            .map(|r| r.context.as_deref().unwrap())
            .collect();
        assert_eq!(contexts, ["a", "b"]);
        assert!(collection
            .requests
            .iter()
            .all(|r| r.request_type == Some(RequestType::BatchIssue)));
    }

    #[test]
    fn test_response_collection() {
        let xml = format!(
            r#"<wst:RequestSecurityTokenResponseCollection xmlns:wst="{WST}">
                 <wst:RequestSecurityTokenResponse Context="c">
                   <wst:TokenType>urn:t</wst:TokenType>
                   <wst:RequestedSecurityToken><tok:T xmlns:tok="urn:tok" Id="1"/></wst:RequestedSecurityToken>
                   <wst:RequestedProofToken><wst:ComputedKey>{WST}/CK/PSHA1</wst:ComputedKey></wst:RequestedProofToken>
                   <wst:KeyType>{WST}/SymmetricKey</wst:KeyType>
                   <wst:RequestedTokenCancelled/>
                 </wst:RequestSecurityTokenResponse>
               </wst:RequestSecurityTokenResponseCollection>"#
        );
        let WsTrustMessage::ResponseCollection(collection) =
            WsTrustParser::new().parse_str(&xml).unwrap()
        else {
            panic!("expected a response collection");
        };
        let rstr = &collection.responses[0];
        assert_eq!(rstr.context.as_deref(), Some("c"));
        assert_eq!(rstr.key_type, Some(KeyType::Symmetric));
        assert!(rstr.requested_token_cancelled);
        assert_eq!(
            rstr.requested_proof_token,
            Some(RequestedProofToken::ComputedKey(format!("{WST}/CK/PSHA1")))
        );
        let token = rstr.requested_security_token.as_ref().unwrap();
        assert_eq!(token.attribute("Id"), Some("1"));
    }

    #[test]
    fn test_parse_element_records_source() {
        let xml = format!(
            r#"<wst:RequestSecurityToken xmlns:wst="{WST}"><wst:ValidateTarget><tok:T xmlns:tok="urn:tok"/></wst:ValidateTarget></wst:RequestSecurityToken>"#
        );
        let element = ElementReader::new(&xml).unwrap().raw_subtree().unwrap();
        let WsTrustMessage::Request(rst) = WsTrustParser::new().parse_element(&element).unwrap()
        else {
            panic!("expected a request");
        };
        assert_eq!(rst.source.as_deref(), Some(&element));
        assert!(matches!(rst.target, Some(TokenTarget::Validate(ref t)) if t.local_name() == "T"));
    }
}
