//! vecgate server - HTTP front end for the batch vectorization gateway
//!
//! Serves the custom-skill vectorize contract over axum so search indexers
//! and query-time vectorizers can call it directly.
//!
//! # Features
//!
//! - **Authentication**: API keys compared in constant time, per-key rate limiting
//! - **Middleware**: Compression, CORS, request ID tracking, structured logging
//! - **Configuration**: `.env`, `vecgate.toml` and `VECGATE__*` environment variables
//! - **Observability**: Prometheus metrics and readiness tied to the provider circuit
//! - **Graceful Shutdown**: Ctrl+C and SIGTERM
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! ## Public Endpoints (No Authentication)
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe (503 while the provider circuit is open)
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Protected Endpoints (API Key Required when keys are configured)
//!
//! - `POST /api/v1/vectorize` - Vectorize a batch of records
//! - `POST {route}` - Same, on the configured route (default `/`)

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
