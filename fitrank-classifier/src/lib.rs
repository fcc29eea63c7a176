//! fitrank Classifier
//!
//! Assigns a label, confidence and sentiment to each normalized signal:
//! - **Rules**: fixed regex taxonomy, runs first
//! - **Model**: LLM-backed fallback for inconclusive rule results
//! - **Cache**: process-wide, keyed by content hash, first writer wins
//! - **Sentiment**: lexicon scoring, independent of the label

pub mod backend;
pub mod cache;
pub mod classifier;
pub mod model;
pub mod rules;
pub mod sentiment;

pub use backend::*;
pub use cache::*;
pub use classifier::*;
pub use model::*;
pub use rules::*;
pub use sentiment::*;
