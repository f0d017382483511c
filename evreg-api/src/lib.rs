//! HTTP API for the evreg event-registration backend.
//!
//! Exposes slot availability reads, registration writes, and the operator
//! surface of the slot cache subsystem (manual reinitialization and status
//! records). The interesting logic lives in the `evreg` crate; this crate is
//! routing, request/response shapes, and process wiring.

pub mod config;
pub mod routes;
pub mod startup;
