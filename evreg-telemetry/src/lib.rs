//! Telemetry initialization shared by evreg binaries.

pub mod tracing;
