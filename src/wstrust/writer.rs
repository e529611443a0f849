//! Renders the typed model as WS-Trust XML.

use crate::wstrust::constants::{BASE_NAMESPACE, PREFIX, attributes, elements, ns, prefix};
use crate::wstrust::model::{
    AppliesTo, BinarySecret, Claims, EndpointReference, Entropy, Lifetime, OnBehalfOf, Renewing,
    RequestSecurityToken, RequestSecurityTokenCollection, RequestSecurityTokenResponse,
    RequestSecurityTokenResponseCollection, RequestedProofToken, RequestedReference, Status,
    TokenTarget, UseKey, WsTrustMessage, format_instant,
};
use crate::xml::XmlElement;

fn wst(local_name: &str) -> XmlElement {
    XmlElement::new(BASE_NAMESPACE, PREFIX, local_name)
}

fn wst_text(local_name: &str, text: &str) -> XmlElement {
    XmlElement::text_element(BASE_NAMESPACE, PREFIX, local_name, text)
}

fn with_context(element: XmlElement, context: Option<&str>) -> XmlElement {
    match context {
        Some(context) => element.with_attribute(attributes::CONTEXT, context),
        None => element,
    }
}

pub fn lifetime(lifetime: &Lifetime) -> XmlElement {
    wst(elements::LIFETIME)
        .with_child(XmlElement::text_element(
            ns::WSU,
            prefix::WSU,
            elements::CREATED,
            &format_instant(&lifetime.created),
        ))
        .with_child(XmlElement::text_element(
            ns::WSU,
            prefix::WSU,
            elements::EXPIRES,
            &format_instant(&lifetime.expires),
        ))
}

fn endpoint_reference(reference: &EndpointReference) -> XmlElement {
    XmlElement::new(ns::WSA, prefix::WSA, elements::ENDPOINT_REFERENCE).with_child(
        XmlElement::text_element(ns::WSA, prefix::WSA, elements::ADDRESS, &reference.address),
    )
}

pub fn applies_to(applies_to: &AppliesTo) -> XmlElement {
    XmlElement::new(ns::WSP, prefix::WSP, elements::APPLIES_TO)
        .with_optional_child(applies_to.endpoint_reference.as_ref().map(endpoint_reference))
}

fn issuer(issuer: &EndpointReference) -> XmlElement {
    wst(elements::ISSUER).with_child(XmlElement::text_element(
        ns::WSA,
        prefix::WSA,
        elements::ADDRESS,
        &issuer.address,
    ))
}

fn on_behalf_of(on_behalf_of: &OnBehalfOf) -> XmlElement {
    let token = &on_behalf_of.username_token;
    let mut username_token = XmlElement::new(ns::WSSE, prefix::WSSE, elements::USERNAME_TOKEN);
    if let Some(id) = &token.id {
        username_token = username_token.with_qualified_attribute(
            ns::WSU,
            prefix::WSU,
            attributes::ID,
            id.clone(),
        );
    }
    wst(elements::ON_BEHALF_OF).with_child(username_token.with_child(XmlElement::text_element(
        ns::WSSE,
        prefix::WSSE,
        elements::USERNAME,
        &token.username,
    )))
}

fn binary_secret(secret: &BinarySecret) -> XmlElement {
    let element = wst_text(elements::BINARY_SECRET, &secret.value);
    match &secret.secret_type {
        Some(secret_type) => element.with_attribute(attributes::TYPE, secret_type.clone()),
        None => element,
    }
}

pub fn entropy(entropy: &Entropy) -> XmlElement {
    wst(elements::ENTROPY).with_child(binary_secret(&entropy.binary_secret))
}

fn use_key(use_key: &UseKey) -> XmlElement {
    let content = match use_key {
        UseKey::Certificate(cert) => XmlElement::new(ns::DSIG, prefix::DSIG, elements::X509_DATA)
            .with_child(XmlElement::text_element(
                ns::DSIG,
                prefix::DSIG,
                elements::X509_CERTIFICATE,
                cert,
            )),
        UseKey::KeyValue(element) | UseKey::KeyInfo(element) | UseKey::Opaque(element) => {
            element.clone()
        }
    };
    wst(elements::USE_KEY).with_child(content)
}

fn target(target: &TokenTarget) -> XmlElement {
    wst(target.element_name()).with_child(target.token().clone())
}

fn renewing(renewing: &Renewing) -> XmlElement {
    let mut element = wst(elements::RENEWING);
    if let Some(allow) = renewing.allow {
        element.set_attribute(attributes::ALLOW, allow.to_string());
    }
    if let Some(ok) = renewing.ok {
        element.set_attribute(attributes::OK, ok.to_string());
    }
    element
}

fn claims(claims: &Claims) -> XmlElement {
    claims.element.clone()
}

pub fn status(status: &Status) -> XmlElement {
    let element = wst(elements::STATUS).with_child(wst_text(elements::CODE, &status.code));
    element.with_optional_child(
        status
            .reason
            .as_deref()
            .map(|reason| wst_text(elements::REASON, reason)),
    )
}

fn proof_token(proof: &RequestedProofToken) -> XmlElement {
    let content = match proof {
        RequestedProofToken::BinarySecret(secret) => binary_secret(secret),
        RequestedProofToken::ComputedKey(algorithm) => wst_text(elements::COMPUTED_KEY, algorithm),
    };
    wst(elements::REQUESTED_PROOF_TOKEN).with_child(content)
}

fn requested_reference(local_name: &str, reference: &RequestedReference) -> XmlElement {
    let str_ref = &reference.security_token_reference;
    let mut element = XmlElement::new(ns::WSSE, prefix::WSSE, elements::SECURITY_TOKEN_REFERENCE);
    if let Some(token_type) = &str_ref.token_type {
        element = element.with_qualified_attribute(
            ns::WSSE11,
            prefix::WSSE11,
            attributes::TOKEN_TYPE,
            token_type.clone(),
        );
    }
    if let Some(key_identifier) = &str_ref.key_identifier {
        let mut child = XmlElement::text_element(
            ns::WSSE,
            prefix::WSSE,
            elements::KEY_IDENTIFIER,
            &key_identifier.value,
        );
        if let Some(value_type) = &key_identifier.value_type {
            child.set_attribute(attributes::VALUE_TYPE, value_type.clone());
        }
        element.push_child(child);
    }
    if let Some(reference) = &str_ref.reference {
        let mut child = XmlElement::new(ns::WSSE, prefix::WSSE, elements::REFERENCE)
            .with_attribute(attributes::URI, reference.uri.clone());
        if let Some(value_type) = &reference.value_type {
            child.set_attribute(attributes::VALUE_TYPE, value_type.clone());
        }
        element.push_child(child);
    }
    wst(local_name).with_child(element)
}

/// Renders a `RequestSecurityToken`
pub fn request(rst: &RequestSecurityToken) -> XmlElement {
    let mut element = with_context(wst(elements::RST), rst.context.as_deref());
    let children = [
        rst.request_type
            .as_ref()
            .map(|t| wst_text(elements::REQUEST_TYPE, t.as_uri())),
        rst.token_type
            .as_deref()
            .map(|t| wst_text(elements::TOKEN_TYPE, t)),
        rst.applies_to.as_ref().map(applies_to),
        rst.claims.as_ref().map(claims),
        rst.lifetime.as_ref().map(lifetime),
        rst.on_behalf_of.as_ref().map(on_behalf_of),
        rst.issuer.as_ref().map(issuer),
        rst.entropy.as_ref().map(entropy),
        rst.key_size
            .map(|size| wst_text(elements::KEY_SIZE, &size.to_string())),
        rst.key_type
            .as_ref()
            .map(|t| wst_text(elements::KEY_TYPE, t.as_uri())),
        rst.use_key.as_ref().map(use_key),
        rst.renewing.as_ref().map(renewing),
        rst.computed_key_algorithm
            .as_deref()
            .map(|a| wst_text(elements::COMPUTED_KEY_ALGORITHM, a)),
        rst.key_wrap_algorithm
            .as_deref()
            .map(|a| wst_text(elements::KEY_WRAP_ALGORITHM, a)),
        rst.signature_algorithm
            .as_deref()
            .map(|a| wst_text(elements::SIGNATURE_ALGORITHM, a)),
        rst.target.as_ref().map(target),
    ];
    for child in children.into_iter().flatten() {
        element.push_child(child);
    }
    for extension in &rst.extensions {
        element.push_child(extension.clone());
    }
    element
}

/// Renders a `RequestSecurityTokenResponse`
pub fn response(rstr: &RequestSecurityTokenResponse) -> XmlElement {
    let mut element = with_context(wst(elements::RSTR), rstr.context.as_deref());
    let children = [
        rstr.token_type
            .as_deref()
            .map(|t| wst_text(elements::TOKEN_TYPE, t)),
        rstr.request_type
            .as_ref()
            .map(|t| wst_text(elements::REQUEST_TYPE, t.as_uri())),
        rstr.lifetime.as_ref().map(lifetime),
        rstr.applies_to.as_ref().map(applies_to),
        rstr.on_behalf_of.as_ref().map(on_behalf_of),
        rstr.issuer.as_ref().map(issuer),
        rstr.key_size
            .map(|size| wst_text(elements::KEY_SIZE, &size.to_string())),
        rstr.key_type
            .as_ref()
            .map(|t| wst_text(elements::KEY_TYPE, t.as_uri())),
        rstr.computed_key_algorithm
            .as_deref()
            .map(|a| wst_text(elements::COMPUTED_KEY_ALGORITHM, a)),
        rstr.use_key.as_ref().map(use_key),
        rstr.renewing.as_ref().map(renewing),
        rstr.requested_security_token
            .as_ref()
            .map(|token| wst(elements::REQUESTED_TOKEN).with_child(token.clone())),
        rstr.requested_attached_reference
            .as_ref()
            .map(|r| requested_reference(elements::REQUESTED_ATTACHED_REFERENCE, r)),
        rstr.requested_unattached_reference
            .as_ref()
            .map(|r| requested_reference(elements::REQUESTED_UNATTACHED_REFERENCE, r)),
        rstr.requested_proof_token.as_ref().map(proof_token),
        rstr.entropy.as_ref().map(entropy),
        rstr.status.as_ref().map(status),
        rstr.requested_token_cancelled
            .then(|| wst(elements::REQUESTED_TOKEN_CANCELLED)),
    ];
    for child in children.into_iter().flatten() {
        element.push_child(child);
    }
    for extension in &rstr.extensions {
        element.push_child(extension.clone());
    }
    element
}

pub fn request_collection(collection: &RequestSecurityTokenCollection) -> XmlElement {
    collection
        .requests
        .iter()
        .fold(wst(elements::RST_COLLECTION), |element, rst| {
            element.with_child(request(rst))
        })
}

pub fn response_collection(collection: &RequestSecurityTokenResponseCollection) -> XmlElement {
    collection
        .responses
        .iter()
        .fold(wst(elements::RSTR_COLLECTION), |element, rstr| {
            element.with_child(response(rstr))
        })
}

pub fn message(message: &WsTrustMessage) -> XmlElement {
    match message {
        WsTrustMessage::Request(rst) => request(rst),
        WsTrustMessage::RequestCollection(collection) => request_collection(collection),
        WsTrustMessage::Response(rstr) => response(rstr),
        WsTrustMessage::ResponseCollection(collection) => response_collection(collection),
    }
}
