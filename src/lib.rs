//! Zero-trust validation gateway library.

pub mod config;
pub mod http;
pub mod net;
pub mod observability;
pub mod pipeline;
pub mod trust;

pub use config::schema::TrustConfig;
pub use http::GatewayServer;
pub use pipeline::SecurityValidationPipeline;
pub use trust::CertificateTrustPipeline;
