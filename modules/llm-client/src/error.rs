use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response from the API. The status is surfaced so callers can
    /// route 403s through a model fallback chain.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid API key header")]
    InvalidApiKey,

    #[error("empty completion")]
    EmptyCompletion,
}

impl LlmError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, LlmError::Api { status: 403, .. })
    }
}
