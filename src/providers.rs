//! Built-in token providers and claims processors.

pub mod claims;
pub mod revocation;
pub mod saml11;
pub mod saml2;
pub mod special;

pub use claims::AttributeClaimsProcessor;
pub use revocation::{MemoryRevocationRegistry, RedisRevocationRegistry, RevocationRegistry};
pub use saml11::Saml11TokenProvider;
pub use saml2::Saml20TokenProvider;
pub use special::SpecialTokenProvider;
