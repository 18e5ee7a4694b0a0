//! UDP ingestion coordinator.
//!
//! - [`listener`]: owns the UDP socket and feeds a bounded queue drained
//!   by a bounded pool of processing tasks.
//! - [`pipeline`]: per-datagram state machine: parse, dedup, persist,
//!   correlate, fine, publish.
//! - [`stats`]: counters exposed to operators.
//! - [`capture_index`]: file-drop scanner that records camera captures.
//! - [`config`]: environment configuration.

pub mod capture_index;
pub mod config;
pub mod error;
pub mod listener;
pub mod pipeline;
pub mod stats;

pub use config::IngestConfig;
pub use error::{ConfigError, IngestError, PipelineError};
pub use listener::UdpListener;
pub use pipeline::{Collaborators, Datagram, DatagramOutcome, Pipeline};
pub use stats::{IngestStats, StatsSnapshot};
