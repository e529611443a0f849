pub mod client;
pub mod config;
pub mod crypto;
pub mod providers;
pub mod server;
pub mod soap;
pub mod telemetry;
pub mod wstrust;
pub mod xml;
pub mod xmlsec;
