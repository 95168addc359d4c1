//! Workspace umbrella crate for vecgate.
//!
//! Re-exports the gateway core so callers get one dependency, and the HTTP
//! front end behind the default `server` feature.
//!
//! ```no_run
//! use vecgate::{BatchRequest, Gateway, GatewayConfig, InputRecord, ProviderKind};
//!
//! # async fn run() -> Result<(), vecgate::GatewayError> {
//! let mut config = GatewayConfig::default();
//! config.provider.kind = ProviderKind::Stub;
//! let gateway = Gateway::new(config)?;
//! let response = gateway
//!     .embed(BatchRequest::new(vec![InputRecord::text(0, "green apple")]))
//!     .await?;
//! assert_eq!(response.len(), 1);
//! # Ok(())
//! # }
//! ```

pub use gateway::*;

#[cfg(feature = "server")]
pub use server;
