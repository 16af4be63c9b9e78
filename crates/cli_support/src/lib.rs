//! Shared CLI plumbing: backend choice, common flags and tracing setup.

pub mod common;
pub mod logging;

pub use common::{validate_backend_choice, BackendKind, CommonArgs};
pub use logging::init_tracing;
