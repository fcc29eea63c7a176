//! fitrank Search Layer
//!
//! Web search collaborators feeding the pipeline:
//! - HTTP client construction with bounded retry and backoff
//! - Serper (web + news) and Brave providers behind one trait
//! - Fan-out across providers and across planned queries
//! - Query planning from free text
//! - Snippet cleanup (HTML to text, relative dates)

pub mod brave;
pub mod client;
pub mod fanout;
pub mod provider;
pub mod query;
pub mod serper;
pub mod text;

pub use brave::*;
pub use client::*;
pub use fanout::*;
pub use provider::*;
pub use query::*;
pub use serper::*;
pub use text::*;
