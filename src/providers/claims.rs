use serde_json::Value;
use tracing::debug;

use crate::wstrust::context::{ClaimedAttributes, Principal};
use crate::wstrust::error::ProviderError;
use crate::wstrust::model::Claims;
use crate::wstrust::provider::{ClaimsProcessor, Properties};

/// Resolves requested claims from statically configured attribute values.
///
/// Each child of `Claims` names a claim through its `Uri` attribute, or its
/// text when the attribute is absent. The configured property of that name
/// holds the value; comma separated values become a multi-valued attribute.
/// A property prefixed with `principal-name/` overrides the shared value for
/// that principal.
#[derive(Debug, Default)]
pub struct AttributeClaimsProcessor {
    properties: Properties,
}

impl AttributeClaimsProcessor {
    fn lookup(&self, claim: &str, principal: Option<&Principal>) -> Option<&String> {
        principal
            .and_then(|p| self.properties.get(&format!("{}/{claim}", p.name())))
            .or_else(|| self.properties.get(claim))
    }
}

fn attribute_value(raw: &str) -> Value {
    if raw.contains(',') {
        Value::Array(
            raw.split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        )
    } else {
        Value::String(raw.to_string())
    }
}

impl ClaimsProcessor for AttributeClaimsProcessor {
    fn initialize(&mut self, properties: &Properties) -> Result<(), ProviderError> {
        self.properties = properties.clone();
        Ok(())
    }

    fn process_claims(
        &self,
        claims: &Claims,
        principal: Option<&Principal>,
    ) -> Result<ClaimedAttributes, ProviderError> {
        let mut attributes = ClaimedAttributes::new();
        for claim in claims.element.elements() {
            let name = match claim.attribute("Uri") {
                Some(uri) => uri.to_string(),
                None => claim.text().trim().to_string(),
            };
            if name.is_empty() {
                continue;
            }
            match self.lookup(&name, principal) {
                Some(raw) => {
                    attributes.insert(name, attribute_value(raw));
                }
                None => debug!(claim = %name, "No value configured for requested claim"),
            }
        }
        Ok(attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wstrust::constants::BASE_NAMESPACE;
    use crate::xml::XmlElement;

    const IC: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity";

    fn claims(uris: &[&str]) -> Claims {
        let mut element = XmlElement::new(BASE_NAMESPACE, "wst", "Claims");
        for uri in uris {
            element.push_child(XmlElement::new(IC, "ic", "ClaimType").with_attribute("Uri", *uri));
        }
        Claims {
            dialect: Some(IC.to_string()),
            element,
        }
    }

    fn processor() -> AttributeClaimsProcessor {
        let mut processor = AttributeClaimsProcessor::default();
        let properties = Properties::from([
            ("urn:email".to_string(), "user@example.org".to_string()),
            ("urn:role".to_string(), "reader, writer".to_string()),
            ("admin/urn:role".to_string(), "admin".to_string()),
        ]);
        processor.initialize(&properties).unwrap();
        processor
    }

    #[test]
    fn test_single_and_multi_valued_claims() {
        let attributes = processor()
            .process_claims(&claims(&["urn:email", "urn:role"]), None)
            .unwrap();

        assert_eq!(attributes["urn:email"], Value::from("user@example.org"));
        assert_eq!(attributes["urn:role"], serde_json::json!(["reader", "writer"]));
    }

    #[test]
    fn test_principal_override() {
        let admin = Principal::new("admin");
        let attributes = processor()
            .process_claims(&claims(&["urn:role"]), Some(&admin))
            .unwrap();
        assert_eq!(attributes["urn:role"], Value::from("admin"));
    }

    #[test]
    fn test_unknown_claims_are_skipped() {
        let attributes = processor()
            .process_claims(&claims(&["urn:unknown"]), None)
            .unwrap();
        assert!(attributes.is_empty());
    }

    #[test]
    fn test_claim_named_by_text() {
        let mut element = XmlElement::new(BASE_NAMESPACE, "wst", "Claims");
        element.push_child(XmlElement::text_element(IC, "ic", "ClaimType", "urn:email"));
        let claims = Claims {
            dialect: None,
            element,
        };
        let attributes = processor().process_claims(&claims, None).unwrap();
        assert_eq!(attributes.len(), 1);
    }
}
