//! Runtime glue that wires configs, the network registry, sinks, telemetry,
//! and runner orchestration.

pub mod config;
pub mod networks;
pub mod runner;
pub mod sink;
pub mod telemetry;
