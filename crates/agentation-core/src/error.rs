use thiserror::Error;

/// The five error kinds the broker ever surfaces, each with one wire-level signal
/// at the HTTP and ACP boundaries (see `agentation-http::error` and `agentation-acp::error`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
