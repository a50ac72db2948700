pub mod keywords;
pub mod pipeline;
pub mod relevance;
pub mod selective;

pub use pipeline::{EnrichStats, EnrichmentPipeline};
pub use relevance::{Classification, RelevanceClassifier};
pub use selective::{ArticleExtraction, ExtractionMethod, SelectiveProcessor};
