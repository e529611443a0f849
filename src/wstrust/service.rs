//! Token service façade: parses the SOAP body, dispatches every request to
//! the configured handler and marshals the response collection.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, error, instrument};

use crate::config::StsConfig;
use crate::wstrust::context::Principal;
use crate::wstrust::error::WsTrustError;
use crate::wstrust::handler::RequestHandler;
use crate::wstrust::model::{
    BinarySecurityToken, RequestSecurityToken, RequestSecurityTokenResponse,
    RequestSecurityTokenResponseCollection, RequestType, WsTrustMessage,
};
use crate::wstrust::parser::WsTrustParser;
use crate::wstrust::provider::PluginRegistry;
use crate::wstrust::registry::StsConfiguration;
use crate::wstrust::writer;
use crate::xml::XmlElement;

type Result<T> = std::result::Result<T, WsTrustError>;

struct Runtime {
    configuration: Arc<StsConfiguration>,
    handler: Box<dyn RequestHandler>,
}

/// Entry point of the STS. The configuration is built on the first request
/// and shared by every request after that.
pub struct SecurityTokenService {
    config: StsConfig,
    plugins: PluginRegistry,
    parser: WsTrustParser,
    runtime: OnceCell<Runtime>,
}

impl SecurityTokenService {
    pub fn new(config: StsConfig, plugins: PluginRegistry) -> Self {
        Self {
            config,
            plugins,
            parser: WsTrustParser::new(),
            runtime: OnceCell::new(),
        }
    }

    /// Service over an already built configuration
    pub fn with_configuration(
        configuration: Arc<StsConfiguration>,
        plugins: PluginRegistry,
    ) -> Result<Self> {
        let handler = plugins.create_handler(
            configuration.request_handler(),
            Arc::clone(&configuration),
        )?;
        let runtime = Runtime {
            configuration,
            handler,
        };
        Ok(Self {
            config: StsConfig::default(),
            plugins,
            parser: WsTrustParser::new(),
            runtime: OnceCell::new_with(Some(runtime)),
        })
    }

    async fn runtime(&self) -> Result<&Runtime> {
        self.runtime
            .get_or_try_init(|| async {
                let configuration =
                    Arc::new(StsConfiguration::from_config(&self.config, &self.plugins)?);
                let handler = self.plugins.create_handler(
                    configuration.request_handler(),
                    Arc::clone(&configuration),
                )?;
                debug!(configuration = ?configuration, "STS configuration loaded");
                Ok::<_, WsTrustError>(Runtime {
                    configuration,
                    handler,
                })
            })
            .await
    }

    pub async fn configuration(&self) -> Result<Arc<StsConfiguration>> {
        Ok(Arc::clone(&self.runtime().await?.configuration))
    }

    /// Processes the WS-Trust payload of a SOAP body.
    ///
    /// `binary_token` is the `BinarySecurityToken` found in the SOAP header,
    /// handed to every request of the message.
    #[instrument(skip_all, fields(caller = ?caller.map(Principal::name)))]
    pub async fn invoke(
        &self,
        payload: &XmlElement,
        binary_token: Option<BinarySecurityToken>,
        caller: Option<&Principal>,
    ) -> Result<XmlElement> {
        let message = self.parser.parse_element(payload).inspect_err(|e| {
            error!(error = %e, "Unable to parse WS-Trust payload");
        })?;
        let collection = self.invoke_message(message, binary_token, caller).await?;
        Ok(writer::response_collection(&collection))
    }

    /// Processes a parsed message. Responses are always wrapped in a collection.
    pub async fn invoke_message(
        &self,
        message: WsTrustMessage,
        binary_token: Option<BinarySecurityToken>,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponseCollection> {
        let requests = match message {
            WsTrustMessage::Request(request) => vec![request],
            WsTrustMessage::RequestCollection(collection) => collection.requests,
            WsTrustMessage::Response(_) | WsTrustMessage::ResponseCollection(_) => {
                error!("Received a response where a request was expected");
                return Err(WsTrustError::UnsupportedRequestType(
                    "RequestSecurityTokenResponse".to_string(),
                ));
            }
        };

        let mut responses = Vec::with_capacity(requests.len());
        for mut request in requests {
            if request.binary_token.is_none() {
                request.binary_token = binary_token.clone();
            }
            let response = self.handle(request, caller).await.inspect_err(|e| {
                error!(error = %e, "WS-Trust request failed");
            })?;
            responses.push(response);
        }
        Ok(RequestSecurityTokenResponseCollection { responses })
    }

    async fn handle(
        &self,
        request: RequestSecurityToken,
        caller: Option<&Principal>,
    ) -> Result<RequestSecurityTokenResponse> {
        let runtime = self.runtime().await?;
        let handler = runtime.handler.as_ref();

        let request_type = request
            .request_type
            .clone()
            .ok_or(WsTrustError::MissingRequestType)?;
        debug!(request_type = %request_type, "Dispatching request");

        match request_type {
            RequestType::Issue | RequestType::BatchIssue | RequestType::Renew => {
                let original = request.clone();
                let mut response = if request_type == RequestType::Renew {
                    handler.renew(request, caller).await?
                } else {
                    handler.issue(request, caller).await?
                };
                handler.post_process(&original, &mut response)?;
                Ok(response)
            }
            RequestType::Cancel => handler.cancel(request, caller).await,
            RequestType::Validate => handler.validate(request, caller).await,
            RequestType::Other(uri) => Err(WsTrustError::UnsupportedRequestType(uri)),
        }
    }
}
