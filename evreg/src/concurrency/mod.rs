//! Concurrency primitives for background job coordination.

pub mod shutdown;
