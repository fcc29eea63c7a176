//! fitrank Runtime
//!
//! Runs the ranking pipeline per request:
//! - Validates run requests before any collaborator call
//! - Drives search -> normalize -> persist -> classify -> score -> rank
//! - Enforces the job deadline and external cancellation
//! - Salvages partial results when a run is interrupted
//! - Tracks jobs for polling and cancellation

pub mod orchestrator;
pub mod registry;
pub mod request;
pub mod store;

pub use orchestrator::*;
pub use registry::*;
pub use request::*;
pub use store::*;
