//! fitrank Core - domain model and pure pipeline stages
//!
//! This crate provides the foundational primitives:
//! - Companies and signals gathered from web search results
//! - The signal normalizer (raw search result -> Signal)
//! - The fit score engine (classified signals -> bounded, explainable score)
//! - The ranker (fit scores -> top-K list)
//! - The job state machine and wire error codes

pub mod company;
pub mod error;
pub mod job;
pub mod normalizer;
pub mod ranker;
pub mod scoring;
pub mod signals;

pub use company::*;
pub use error::*;
pub use job::*;
pub use normalizer::*;
pub use ranker::*;
pub use scoring::*;
pub use signals::*;

/// Lookback window for tech, leadership and funding evidence (days)
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;

/// Short window used to count recent signal volume (days)
pub const DEFAULT_RECENT_WINDOW_DAYS: i64 = 30;

/// Signal count at which recent volume saturates
pub const DEFAULT_VOLUME_CAP: f64 = 5.0;

/// Minimum feature value disclosed as a reason
pub const DEFAULT_REASON_FLOOR: f64 = 0.30;

/// Rule-path confidence above which the model path is skipped
pub const DEFAULT_RULE_THRESHOLD: f64 = 0.75;
