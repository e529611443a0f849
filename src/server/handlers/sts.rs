use axum::{
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use crate::server::AppState;
use crate::server::errors::AppError;
use crate::server::responses::SoapResponse;
use crate::soap::{self, SoapMessage, SoapVersion};
use crate::wstrust::context::Principal;

/// Handles a WS-Trust request carried in a SOAP envelope.
///
/// The answer uses the SOAP version of the request. Before the envelope is
/// read, the version is taken from the `Content-Type` header so even a
/// malformed request gets a fault it understands.
#[instrument(skip_all)]
pub async fn sts_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let mut version = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(SoapVersion::from_content_type)
        .unwrap_or_default();

    let caller = headers
        .get(&*state.caller_header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Principal::new);

    debug!(req = %body, caller = ?caller.as_ref().map(Principal::name), "Processing STS request");

    match process(&state, &body, caller.as_ref(), &mut version).await {
        Ok(xml) => {
            debug!(xml = %xml, "Sending response");
            SoapResponse::new(version, xml).into_response()
        }
        Err(e) => e.into_fault(version).into_response(),
    }
}

async fn process(
    state: &AppState,
    body: &str,
    caller: Option<&Principal>,
    version: &mut SoapVersion,
) -> Result<String, AppError> {
    let message = SoapMessage::parse(body)?;
    *version = message.version();

    let response = state
        .sts
        .invoke(message.payload(), message.binary_security_token(), caller)
        .await?;
    Ok(soap::to_envelope_string(*version, response)?)
}
