//! Deckhand infrastructure: process-level bootstrap shared by binaries
//! and long-running services.

pub mod telemetry;

pub use telemetry::init_telemetry;
