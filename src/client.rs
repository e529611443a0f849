//! HTTP client for WS-Trust token services.
//!
//! Requests are written as SOAP 1.1 envelopes. Every answer is read as a
//! response collection, a bare response counting as a collection of one.

use std::time::Duration;

use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::soap::{self, ReceivedFault, SoapError, SoapMessage, SoapVersion};
use crate::wstrust::constants::BASE_NAMESPACE;
use crate::wstrust::model::{
    RequestSecurityToken, RequestSecurityTokenCollection, RequestSecurityTokenResponse,
    RequestType, TokenTarget, WsTrustMessage,
};
use crate::wstrust::parser::WsTrustParser;
use crate::wstrust::writer;
use crate::xml::{ParseError, XmlElement};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timeout while waiting for the token service")]
    Timeout,

    #[error(transparent)]
    Soap(#[from] SoapError),

    #[error("Invalid WS-Trust response: {0}")]
    Parse(#[from] ParseError),

    #[error("Token service returned a fault ({code}): {reason}")]
    Fault { code: String, reason: String },

    #[error("Unexpected response from token service: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Whether the service blamed the request
    pub fn is_client_fault(&self) -> bool {
        match self {
            ClientError::Fault { code, .. } => {
                matches!(code.rsplit(':').next(), Some("Client" | "Sender"))
            }
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Talks to a single STS endpoint
#[derive(Debug, Clone)]
pub struct StsClient {
    http: Client,
    endpoint: String,
    caller: Option<(String, String)>,
    request_timeout: Duration,
    parser: std::sync::Arc<WsTrustParser>,
}

impl StsClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_http_client(Client::new(), endpoint)
    }

    pub fn with_http_client(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            caller: None,
            request_timeout: DEFAULT_TIMEOUT,
            parser: std::sync::Arc::new(WsTrustParser::new()),
        }
    }

    /// Sends the caller name in `header`, for services behind an authenticating proxy
    pub fn with_caller(mut self, header: impl Into<String>, name: impl Into<String>) -> Self {
        self.caller = Some((header.into(), name.into()));
        self
    }

    pub fn with_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Requests a new token. The request type is forced to Issue.
    pub async fn issue(
        &self,
        mut request: RequestSecurityToken,
    ) -> ClientResult<RequestSecurityTokenResponse> {
        request.request_type = Some(RequestType::Issue);
        self.send(&request).await
    }

    pub async fn renew(&self, token: XmlElement) -> ClientResult<RequestSecurityTokenResponse> {
        let request =
            RequestSecurityToken::new(RequestType::Renew).with_target(TokenTarget::Renew(token));
        self.send(&request).await
    }

    pub async fn validate(&self, token: XmlElement) -> ClientResult<RequestSecurityTokenResponse> {
        let request = RequestSecurityToken::new(RequestType::Validate)
            .with_target(TokenTarget::Validate(token));
        self.send(&request).await
    }

    pub async fn cancel(&self, token: XmlElement) -> ClientResult<RequestSecurityTokenResponse> {
        let request =
            RequestSecurityToken::new(RequestType::Cancel).with_target(TokenTarget::Cancel(token));
        self.send(&request).await
    }

    /// Sends a single request and returns the first response of the collection
    pub async fn send(
        &self,
        request: &RequestSecurityToken,
    ) -> ClientResult<RequestSecurityTokenResponse> {
        let action = request
            .request_type
            .as_ref()
            .map(|request_type| format!("{BASE_NAMESPACE}/RST/{}", action_name(request_type)));
        self.post(writer::request(request), action.as_deref())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::UnexpectedResponse("empty response collection".into()))
    }

    /// Sends a request collection and returns the responses in request order
    pub async fn send_batch(
        &self,
        collection: &RequestSecurityTokenCollection,
    ) -> ClientResult<Vec<RequestSecurityTokenResponse>> {
        self.post(writer::request_collection(collection), None).await
    }

    async fn post(
        &self,
        payload: XmlElement,
        action: Option<&str>,
    ) -> ClientResult<Vec<RequestSecurityTokenResponse>> {
        let body = soap::to_envelope_string(SoapVersion::Soap11, payload)?;
        debug!(endpoint = %self.endpoint, body = %body, "Sending WS-Trust request");

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, SoapVersion::Soap11.content_type())
            .header("SOAPAction", format!("\"{}\"", action.unwrap_or_default()))
            .body(body);
        if let Some((header, name)) = &self.caller {
            builder = builder.header(header.as_str(), name.as_str());
        }

        let response = match timeout(self.request_timeout, builder.send()).await {
            Ok(result) => result?,
            Err(_) => return Err(ClientError::Timeout),
        };
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            if let Ok(fault) = ReceivedFault::parse(&text) {
                let code = fault.code().unwrap_or_default().to_string();
                let reason = fault.reason().unwrap_or_default().to_string();
                warn!(code = %code, reason = %reason, "Token service returned a fault");
                return Err(ClientError::Fault { code, reason });
            }
        }
        if !status.is_success() {
            return Err(ClientError::UnexpectedResponse(format!(
                "HTTP error {status} from {}",
                self.endpoint
            )));
        }

        let message = SoapMessage::parse(&text)?;
        let responses = match self.parser.parse_element(message.payload())? {
            WsTrustMessage::ResponseCollection(collection) => collection.responses,
            WsTrustMessage::Response(response) => vec![response],
            WsTrustMessage::Request(_) | WsTrustMessage::RequestCollection(_) => {
                return Err(ClientError::UnexpectedResponse(
                    message.payload().name().to_string(),
                ));
            }
        };
        info!(count = responses.len(), "Received WS-Trust responses");
        Ok(responses)
    }
}

fn action_name(request_type: &RequestType) -> &str {
    match request_type {
        RequestType::Issue => "Issue",
        RequestType::Renew => "Renew",
        RequestType::Cancel => "Cancel",
        RequestType::Validate => "Validate",
        RequestType::BatchIssue => "BatchIssue",
        RequestType::Other(uri) => uri.rsplit('/').next().unwrap_or(uri),
    }
}
