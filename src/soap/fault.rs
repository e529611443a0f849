use crate::soap::{SoapError, SoapMessage, SoapVersion, prefix, to_envelope_string};
use crate::xml::{XML_NS, XmlElement};

/// Party at fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The request is wrong and should not be resent unchanged
    Client,
    Server,
}

impl FaultCode {
    /// Qualified code for the given SOAP version
    pub fn qualified(self, version: SoapVersion) -> &'static str {
        match (self, version) {
            (FaultCode::Client, SoapVersion::Soap11) => "soapenv:Client",
            (FaultCode::Server, SoapVersion::Soap11) => "soapenv:Server",
            (FaultCode::Client, SoapVersion::Soap12) => "soapenv:Sender",
            (FaultCode::Server, SoapVersion::Soap12) => "soapenv:Receiver",
        }
    }
}

/// A fault to send back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: FaultCode,
    pub reason: String,
}

impl SoapFault {
    pub fn new(code: FaultCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The `Fault` element for the given version.
    ///
    /// SOAP 1.1 keeps `faultcode` and `faultstring` unqualified, SOAP 1.2
    /// nests the code and the reason in envelope-namespace elements.
    pub fn to_element(&self, version: SoapVersion) -> XmlElement {
        let env = version.namespace();
        let code = self.code.qualified(version);
        let fault = XmlElement::new(env, prefix::SOAP_ENV, "Fault");

        match version {
            SoapVersion::Soap11 => fault
                .with_child(XmlElement::text_element("", "", "faultcode", code))
                .with_child(XmlElement::text_element("", "", "faultstring", &self.reason)),
            SoapVersion::Soap12 => fault
                .with_child(
                    XmlElement::new(env, prefix::SOAP_ENV, "Code").with_child(
                        XmlElement::text_element(env, prefix::SOAP_ENV, "Value", code),
                    ),
                )
                .with_child(
                    XmlElement::new(env, prefix::SOAP_ENV, "Reason").with_child(
                        XmlElement::text_element(env, prefix::SOAP_ENV, "Text", &self.reason)
                            .with_qualified_attribute(XML_NS, "xml", "lang", "en"),
                    ),
                ),
        }
    }

    /// Serializes the fault inside an envelope of the given version
    pub fn to_soap(&self, version: SoapVersion) -> Result<String, SoapError> {
        to_envelope_string(version, self.to_element(version))
    }
}

/// A fault read from a response, in either SOAP version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFault {
    code: Option<String>,
    reason: Option<String>,
}

impl ReceivedFault {
    /// Parses a fault envelope
    pub fn parse(xml: &str) -> Result<Self, SoapError> {
        let message = SoapMessage::parse(xml)?;
        let env = message.version().namespace();
        let fault = message.payload();
        if !fault.name().is(env, "Fault") {
            return Err(SoapError::NotAFault(fault.name().to_string()));
        }

        let trimmed = |el: &XmlElement| el.text().trim().to_string();
        let (code, reason) = match message.version() {
            SoapVersion::Soap11 => (
                fault.child("", "faultcode").map(trimmed),
                fault.child("", "faultstring").map(trimmed),
            ),
            SoapVersion::Soap12 => (
                fault
                    .child(env, "Code")
                    .and_then(|code| code.child(env, "Value"))
                    .map(trimmed),
                fault
                    .child(env, "Reason")
                    .and_then(|reason| reason.child(env, "Text"))
                    .map(trimmed),
            ),
        };
        Ok(Self { code, reason })
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Whether the fault blames the request
    pub fn is_client_fault(&self) -> bool {
        self.code()
            .and_then(|code| code.rsplit(':').next())
            .is_some_and(|code| code == "Client" || code == "Sender")
    }
}
