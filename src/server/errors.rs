use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::server::responses::SoapResponse;
use crate::soap::{FaultCode, SoapError, SoapFault, SoapVersion};
use crate::wstrust::WsTrustError;

const INTERNAL_ERROR_MESSAGE: &str = "The server encountered an internal error.";

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Soap(#[from] SoapError),
    #[error(transparent)]
    WsTrust(#[from] WsTrustError),
}

impl AppError {
    /// Whether the caller sent a request that cannot succeed as is
    pub fn fault_code(&self) -> FaultCode {
        let client = match self {
            AppError::Soap(e) => matches!(
                e,
                SoapError::Parse(_) | SoapError::NotAnEnvelope(_) | SoapError::EmptyBody
            ),
            AppError::WsTrust(e) => e.is_client_fault(),
        };
        if client {
            FaultCode::Client
        } else {
            FaultCode::Server
        }
    }

    /// Pairs the error with the SOAP version the fault must be written in
    pub fn into_fault(self, version: SoapVersion) -> FaultResponse {
        FaultResponse {
            version,
            error: self,
        }
    }
}

/// An error rendered as a SOAP fault with HTTP 500
#[derive(Debug)]
pub struct FaultResponse {
    version: SoapVersion,
    error: AppError,
}

impl IntoResponse for FaultResponse {
    fn into_response(self) -> Response {
        let code = self.error.fault_code();
        tracing::warn!(error = %self.error, ?code, "Answering with a SOAP fault");

        match SoapFault::new(code, self.error.to_string()).to_soap(self.version) {
            Ok(xml) => SoapResponse::new(self.version, xml)
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)
                .into_response(),
            Err(e) => {
                tracing::error!(error = ?e, "Failed to serialize SOAP fault");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE).into_response()
            }
        }
    }
}
