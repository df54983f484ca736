/// Shared error taxonomy used across the transcript-layer crates.
///
/// `NotFound` and `IllegalTransition` are expected, recoverable outcomes a
/// caller branches on; `Structural` and `Protocol` indicate corrupt input
/// and are fatal to the operation that raised them; `Io`/`Json` are
/// transient store failures that re-raise as-is.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("structural: {0}")]
    Structural(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn illegal_transition(what: impl std::fmt::Display) -> Self {
        Self::IllegalTransition(what.to_string())
    }

    pub fn structural(what: impl std::fmt::Display) -> Self {
        Self::Structural(what.to_string())
    }
}
