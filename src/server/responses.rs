use axum::{
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};

use crate::soap::SoapVersion;

/// A SOAP document answered with the content type of its version
pub struct SoapResponse {
    status: StatusCode,
    version: SoapVersion,
    body: String,
}

impl SoapResponse {
    pub fn new(version: SoapVersion, body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            version,
            body: body.into(),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl IntoResponse for SoapResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(CONTENT_TYPE, self.version.content_type())],
            self.body,
        )
            .into_response()
    }
}
