//! WS-Trust 1.3: data model, parsers and writers, key negotiation, provider
//! registry and the request processing pipeline.

pub mod constants;
pub mod context;
pub mod error;
pub mod handler;
pub mod model;
pub mod parser;
pub mod proof;
pub mod provider;
pub mod registry;
pub mod service;
pub mod writer;

pub use error::{ProviderError, WsTrustError};
pub use service::SecurityTokenService;
