//! Radar operations API server library.
//!
//! Exposes config, state, routes and the WebSocket push so integration
//! tests and the binary entrypoint can both use them.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod ingest;
pub mod response;
pub mod routes;
pub mod state;
pub mod ws;
