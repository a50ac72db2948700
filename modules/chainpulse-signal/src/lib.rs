pub mod alerts;
pub mod scorer;

pub use alerts::{AlertDetector, AlertStats};
pub use scorer::{SignalScorer, SignalStats};
