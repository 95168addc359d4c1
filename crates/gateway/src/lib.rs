//! vecgate gateway
//!
//! Turns batches of images and short texts into fixed-length vectors by way
//! of a remote multimodal embedding model. Search indexers call it while
//! ingesting documents and query vectorizers call it at search time; both
//! speak the same JSON contract (see [`wire`]).
//!
//! Every record gets exactly one outcome: a vector of the configured
//! dimensionality or an in-line error. Records never bring their neighbours
//! down with them, so a missing blob or an unreadable URL costs one record
//! and the rest of the batch still comes back.
//!
//! Providers:
//!
//! - **vision** - Azure AI Vision style `retrieval:vectorizeImage` and
//!   `retrieval:vectorizeText`, one record per call.
//! - **batch** - generic JSON endpoint taking many inputs per call.
//! - **stub** - deterministic hash-derived vectors for local development.
//!
//! ## Secrets
//!
//! Image access tokens and provider API keys are held in [`Secret`], which
//! never prints its value. URLs are logged with their query string removed.
//!
//! ## Quick example
//!
//! ```no_run
//! use gateway::{BatchRequest, Gateway, GatewayConfig, ImageReference, InputRecord};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cfg = GatewayConfig {
//!         provider: gateway::ProviderConfig {
//!             endpoint: Some("https://my-vision.cognitiveservices.azure.com".into()),
//!             api_key: Some("subscription-key".into()),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!     let gateway = Gateway::new(cfg).unwrap();
//!
//!     let batch = BatchRequest::new(vec![
//!         InputRecord::image(
//!             0,
//!             ImageReference::new("https://acct.blob.core.windows.net/pics/cat.jpg")
//!                 .with_token("?sv=2023-01-03&sig=..."),
//!         ),
//!         InputRecord::text(1, "a sleeping cat"),
//!     ]);
//!     let response = gateway.embed(batch).await.unwrap();
//!     println!("{} of {} embedded", response.succeeded(), response.len());
//! }
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod resilience;
pub mod resolve;
pub mod types;
pub mod wire;

mod gateway;
mod normalize;
mod secret;
mod serde_millis;

pub use crate::config::{GatewayConfig, ProviderConfig, ProviderKind, ResolveConfig, ResolveMode};
pub use crate::error::{ErrorCode, GatewayError, RecordError};
pub use crate::gateway::Gateway;
pub use crate::provider::{
    EmbeddingProvider, HttpProvider, ProviderContent, ProviderError, ProviderInput,
    ProviderOutput, StubProvider,
};
pub use crate::resilience::{CircuitBreakerConfig, CircuitState, RateLimitConfig, RetryConfig};
pub use crate::secret::{redact_url, Secret};
pub use crate::types::{
    BatchRequest, BatchResponse, ImageReference, InputRecord, Modality, OutputRecord, Payload,
    RecordId, RecordResult, RecordStage, TextQuery,
};
pub use crate::wire::{SkillRequest, SkillResponse};
