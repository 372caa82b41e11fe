//! HTTP(S) transport: the [`Runner`] that owns request serving.
//!
//! # Responsibilities
//! - Bind the listener with the configured socket flags.
//! - Terminate TLS (rustls) and enforce the client-auth posture.
//! - Define the Axum router with all routes and shared middleware.
//! - Inject shared application state (`AppState`) into handlers.

pub mod handlers;
pub mod listener;
pub mod middleware;
pub mod router;
pub mod runner;
pub mod state;

pub use runner::{RunningServer, Runner};
