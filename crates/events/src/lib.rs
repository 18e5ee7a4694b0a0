//! Radar pipeline event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`RadarEvent`]: the event envelope pushed to dashboards.

pub mod bus;

pub use bus::{event_types, EventBus, RadarEvent};
