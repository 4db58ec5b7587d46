//! Error types and result aliases for Tessera.
//!
//! Errors fall into three groups: caller-contract violations reported
//! synchronously, remote failures that stay attached to a partition until it
//! is resolved, and the transient read-only class that the dispatcher
//! recovers from on its own.

mod error;

pub use error::{TesseraError, TesseraResult};
