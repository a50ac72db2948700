use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainPulseError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
