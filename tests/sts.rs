mod common;

use common::{
    LEGACY_ENDPOINT, SAML11_TOKEN_TYPE, SAML2_TOKEN_TYPE, SP_ENDPOINT, SPECIAL_TOKEN_TYPE, WST, rst,
    soap11, soap12,
};
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use wstrust_sts::soap::{ReceivedFault, SoapMessage, SoapVersion};
use wstrust_sts::wstrust::model::{RequestSecurityTokenResponse, WsTrustMessage};
use wstrust_sts::wstrust::parser::WsTrustParser;

const CALLER_HEADER: &str = "x-authenticated-user";

fn applies_to(address: &str) -> String {
    format!(
        r#"<wsp:AppliesTo xmlns:wsp="http://schemas.xmlsoap.org/ws/2004/09/policy"><wsa:EndpointReference xmlns:wsa="http://www.w3.org/2005/08/addressing"><wsa:Address>{address}</wsa:Address></wsa:EndpointReference></wsp:AppliesTo>"#
    )
}

async fn post(addr: &str, version: SoapVersion, body: String, caller: Option<&str>) -> reqwest::Response {
    let mut request = Client::new()
        .post(format!("{addr}/sts"))
        .header(CONTENT_TYPE, version.content_type())
        .body(body);
    if let Some(caller) = caller {
        request = request.header(CALLER_HEADER, caller);
    }
    request.send().await.unwrap()
}

fn responses(xml: &str) -> Vec<RequestSecurityTokenResponse> {
    let message = SoapMessage::parse(xml).unwrap();
    match WsTrustParser::new().parse_element(message.payload()).unwrap() {
        WsTrustMessage::ResponseCollection(collection) => collection.responses,
        other => panic!("expected a response collection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_issue_signed_saml_assertion_for_service() {
    let addr = common::spawn_server().await;
    let body = soap11(&rst("Issue", &applies_to(SP_ENDPOINT)));

    let response = post(&addr, SoapVersion::Soap11, body, Some("alice")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        SoapVersion::Soap11.content_type()
    );
    let xml = response.text().await.unwrap();
    let responses = responses(&xml);
    assert_eq!(responses.len(), 1);

    let rstr = &responses[0];
    assert_eq!(rstr.context.as_deref(), Some("test-context"));
    assert_eq!(rstr.token_type.as_deref(), Some(SAML2_TOKEN_TYPE));
    assert!(rstr.lifetime.is_some());
    assert!(rstr.requested_attached_reference.is_some());

    let assertion = rstr.requested_security_token.as_ref().unwrap();
    assert_eq!(assertion.local_name(), "Assertion");
    assert!(
        assertion
            .find("http://www.w3.org/2000/09/xmldsig#", "Signature")
            .is_some()
    );
    let name_id = assertion
        .find("urn:oasis:names:tc:SAML:2.0:assertion", "NameID")
        .unwrap();
    assert_eq!(name_id.text().trim(), "alice");
}

#[tokio::test]
async fn test_issue_signed_saml11_assertion_for_service() {
    let addr = common::spawn_server().await;
    let body = soap11(&rst("Issue", &applies_to(LEGACY_ENDPOINT)));

    let response = post(&addr, SoapVersion::Soap11, body, Some("bob")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let responses = responses(&response.text().await.unwrap());
    let rstr = &responses[0];
    assert_eq!(rstr.token_type.as_deref(), Some(SAML11_TOKEN_TYPE));

    let assertion = rstr.requested_security_token.as_ref().unwrap();
    assert!(assertion.name().is("urn:oasis:names:tc:SAML:1.0:assertion", "Assertion"));
    assert_eq!(assertion.attribute("MajorVersion"), Some("1"));
    let id = assertion.attribute("AssertionID").unwrap();
    let signature = assertion
        .elements()
        .last()
        .unwrap();
    assert!(signature.name().is("http://www.w3.org/2000/09/xmldsig#", "Signature"));
    let name = assertion
        .find("urn:oasis:names:tc:SAML:1.0:assertion", "NameIdentifier")
        .unwrap();
    assert_eq!(name.text().trim(), "bob");

    let reference = rstr.requested_attached_reference.as_ref().unwrap();
    let identifier = reference
        .security_token_reference
        .key_identifier
        .as_ref()
        .unwrap();
    assert_eq!(identifier.value, format!("#{id}"));
}

#[tokio::test]
async fn test_soap12_request_gets_soap12_answer() {
    let addr = common::spawn_server().await;
    let inner = format!("<wst:TokenType>{SPECIAL_TOKEN_TYPE}</wst:TokenType>");
    let body = soap12(&rst("Issue", &inner));

    let response = post(&addr, SoapVersion::Soap12, body, Some("bob")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        SoapVersion::Soap12.content_type()
    );
    let xml = response.text().await.unwrap();
    assert_eq!(SoapMessage::parse(&xml).unwrap().version(), SoapVersion::Soap12);

    let responses = responses(&xml);
    let token = responses[0].requested_security_token.as_ref().unwrap();
    assert_eq!(token.local_name(), "SpecialToken");
    assert_eq!(token.text(), "Principal:bob");
}

#[tokio::test]
async fn test_regex_service_provider_selects_token_type() {
    let addr = common::spawn_server().await;
    let body = soap11(&rst("Issue", &applies_to("http://special.example.org/app")));

    let response = post(&addr, SoapVersion::Soap11, body, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let responses = responses(&response.text().await.unwrap());
    assert_eq!(responses[0].token_type.as_deref(), Some(SPECIAL_TOKEN_TYPE));
    let token = responses[0].requested_security_token.as_ref().unwrap();
    assert_eq!(token.text(), "Principal:ANONYMOUS");
}

#[tokio::test]
async fn test_claims_become_assertion_attributes() {
    let addr = common::spawn_server().await;
    let claims = r#"<wst:Claims Dialect="http://schemas.xmlsoap.org/ws/2005/05/identity"><ic:ClaimType xmlns:ic="http://schemas.xmlsoap.org/ws/2005/05/identity" Uri="http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress"/></wst:Claims>"#;
    let body = soap11(&rst("Issue", &format!("{}{claims}", applies_to(SP_ENDPOINT))));

    let response = post(&addr, SoapVersion::Soap11, body, Some("alice")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let xml = response.text().await.unwrap();
    assert!(xml.contains("AttributeStatement"));
    assert!(xml.contains("alice@example.org"));
    assert!(!xml.contains("user@example.org"));
}

#[tokio::test]
async fn test_batch_responses_keep_request_order() {
    let addr = common::spawn_server().await;
    let special = format!("<wst:TokenType>{SPECIAL_TOKEN_TYPE}</wst:TokenType>");
    let batch = format!(
        r#"<wst:RequestSecurityTokenCollection xmlns:wst="{WST}">{}{}</wst:RequestSecurityTokenCollection>"#,
        rst("Issue", &applies_to(SP_ENDPOINT)),
        rst("Issue", &special),
    );

    let response = post(&addr, SoapVersion::Soap11, soap11(&batch), Some("alice")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let responses = responses(&response.text().await.unwrap());
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].token_type.as_deref(), Some(SAML2_TOKEN_TYPE));
    assert_eq!(responses[1].token_type.as_deref(), Some(SPECIAL_TOKEN_TYPE));
}

#[tokio::test]
async fn test_missing_request_type_is_client_fault() {
    let addr = common::spawn_server().await;
    let body = soap11(&format!(
        r#"<wst:RequestSecurityToken xmlns:wst="{WST}"><wst:TokenType>{SPECIAL_TOKEN_TYPE}</wst:TokenType></wst:RequestSecurityToken>"#
    ));

    let response = post(&addr, SoapVersion::Soap11, body, None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let fault = ReceivedFault::parse(&response.text().await.unwrap()).unwrap();
    assert_eq!(fault.code(), Some("soapenv:Client"));
    assert!(fault.reason().unwrap().contains("RequestType"));
}

#[tokio::test]
async fn test_unknown_token_type_is_client_fault() {
    let addr = common::spawn_server().await;
    let body = soap12(&rst("Issue", "<wst:TokenType>urn:unknown</wst:TokenType>"));

    let response = post(&addr, SoapVersion::Soap12, body, None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let fault = ReceivedFault::parse(&response.text().await.unwrap()).unwrap();
    assert_eq!(fault.code(), Some("soapenv:Sender"));
    assert!(fault.is_client_fault());
}

#[tokio::test]
async fn test_malformed_envelope_is_client_fault() {
    let addr = common::spawn_server().await;

    let response = post(&addr, SoapVersion::Soap11, "<notsoap/>".to_string(), None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let fault = ReceivedFault::parse(&response.text().await.unwrap()).unwrap();
    assert!(fault.is_client_fault());
}

#[tokio::test]
async fn test_unknown_element_is_client_fault() {
    let addr = common::spawn_server().await;
    let body = soap11(&rst("Issue", "<wst:Bogus>1</wst:Bogus>"));

    let response = post(&addr, SoapVersion::Soap11, body, None).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let fault = ReceivedFault::parse(&response.text().await.unwrap()).unwrap();
    assert!(fault.is_client_fault());
    assert!(fault.reason().unwrap().contains("Bogus"));
}

#[tokio::test]
async fn test_oversized_key_request_is_client_fault() {
    let addr = common::spawn_server().await;
    let inner = format!(
        "<wst:TokenType>{SPECIAL_TOKEN_TYPE}</wst:TokenType><wst:KeyType>{WST}/SymmetricKey</wst:KeyType><wst:KeySize>80000000</wst:KeySize>"
    );
    let body = soap11(&rst("Issue", &inner));

    let response = post(&addr, SoapVersion::Soap11, body, Some("alice")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let fault = ReceivedFault::parse(&response.text().await.unwrap()).unwrap();
    assert_eq!(fault.code(), Some("soapenv:Client"));
    assert!(fault.reason().unwrap().contains("80000000"));
}
