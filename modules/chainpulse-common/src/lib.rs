pub mod config;
pub mod error;
pub mod normalize;
pub mod types;

pub use config::Config;
pub use error::ChainPulseError;
pub use normalize::{canonical_entities, crypto_entities, is_canonical, normalize_entity_name};
pub use types::*;
