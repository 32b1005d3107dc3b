use std::fmt;

/// The dispatcher never holds a `CoreError` directly — it only ever sees the
/// HTTP Surface's JSON responses — so this is a much smaller taxonomy: a
/// malformed call (bad tool name, missing required argument) or a failure
/// reaching/interpreting the HTTP Surface's response.
#[derive(Debug)]
pub enum AcpError {
    UnknownTool(String),
    InvalidArguments(String),
    Http(String),
}

impl fmt::Display for AcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            Self::InvalidArguments(reason) => write!(f, "{reason}"),
            Self::Http(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for AcpError {}

impl From<reqwest::Error> for AcpError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}
