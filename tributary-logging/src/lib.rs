//! Tracing initialisation for Tributary
//!
//! Console output always goes to stderr: worker processes use stdout for
//! the supervisor protocol.

pub mod init;

pub use init::{build_layers, BoxedLayer, init_logging_from_config, init_simple_tracing, LoggingGuard};
