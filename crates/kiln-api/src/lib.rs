//! HTTP and WebSocket server for the Kiln CI orchestrator.
//!
//! Exposes the registry's command surface over REST and streams engine
//! events to WebSocket clients.

pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

pub use state::AppState;
