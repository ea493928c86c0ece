//! TLS plumbing: verifier adapters and listener/client config assembly.

pub mod limit;
pub mod tls;
pub mod verifier;

pub use limit::ConnectionLimitAcceptor;
pub use tls::{build_client_config, build_listener_config, build_server_config, TlsSetupError};
pub use verifier::{GatewayClientCertVerifier, PinnedServerCertVerifier};
