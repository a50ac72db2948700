//! LLM gateway: two-tier model routing, persistent response caching with
//! per-key single-flight, cost accounting, and lenient JSON parsing.
//!
//! No error from this crate aborts an enclosing cycle: every operation
//! degrades to a structured empty result on parse failure and surfaces
//! transport errors per call.

pub mod cache;
pub mod cost;
pub mod gateway;
pub mod parse;
mod prompts;

pub use cache::{CacheStats, LlmCache};
pub use cost::CostTracker;
pub use gateway::{
    ClusterSummary, EntityExtraction, EntityExtractionInput, ExtractedEntity, LlmGateway,
};
pub use parse::parse_json_lenient;
