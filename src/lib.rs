//! ReasonKit Hooks - Payment-Provider Webhook Receiver & Forwarder
//!
//! This crate provides a production-ready webhook intake server for payment
//! providers: it receives deliveries on per-endpoint URLs, audits every one
//! of them, optionally forwards them downstream, and can replay any stored
//! delivery on demand.
//!
//! # Features
//!
//! - **Dual-protocol intake**: classic (resource id + API fetch) and
//!   next-gen (full payload + HMAC signature) webhook handling
//! - **Append-only audit log**: exactly one log per delivery, queryable and
//!   replayable
//! - **Downstream forwarding**: fire-and-forget POST mirroring with manual
//!   single-hop redirect handling
//! - **Secrets at rest**: AES-256-GCM envelope encryption for API keys and
//!   shared secrets
//!
//! # Architecture
//!
//! ```text
//! Provider ──▶ Intake Router ──▶ Classic / Next-Gen Handler
//!                  │                      │
//!                  ▼                      ▼
//!            ┌──────────┐        ┌───────────────┐
//!            │ Webhook  │        │ Forwarding    │
//!            │ Log      │◀───────│ Engine        │
//!            └────┬─────┘        └───────┬───────┘
//!                 │                      │
//!                 ▼                      ▼
//!           Query / Replay        Downstream consumer
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reasonkit_hooks::config::AppConfig;
//! use reasonkit_hooks::state::AppState;
//! use reasonkit_hooks::server::app_router;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env("127.0.0.1", 3020)?;
//!     let state = Arc::new(AppState::new(config)?);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3020").await?;
//!     axum::serve(listener, app_router(state)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod config;
pub mod cors;
pub mod crypto;
pub mod error;
pub mod forward;
pub mod handlers;
pub mod intake;
pub mod metrics;
pub mod model;
pub mod replay;
pub mod resource;
pub mod server;
pub mod signature;
pub mod state;
pub mod store;

// Re-exports for convenience
pub use error::{Error, Result};
pub use model::{ApiCredential, Endpoint, EndpointKind, LogStatus, ResourceType, WebhookLog};
pub use state::AppState;
pub use store::Store;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// User-agent for all outbound HTTP (forwarding and resource fetches)
pub const USER_AGENT: &str = "ReasonKit-Hooks/1.0";
