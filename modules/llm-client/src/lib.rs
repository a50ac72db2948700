pub mod claude;
pub mod error;
pub mod util;

pub use claude::{ChatRequest, Claude, Completion};
pub use error::LlmError;
pub use util::{sanitize_json_response, truncate_to_char_boundary};
