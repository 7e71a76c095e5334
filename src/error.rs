//! Error types for the Switchboard MCP server.

use thiserror::Error;

/// Result type alias for Switchboard operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the server.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Protocol Errors =====
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    // ===== Registry Errors =====
    #[error("Registration error: {0}")]
    Registration(String),

    // ===== Lifecycle Errors =====
    #[error("Invalid state transition: {0}")]
    State(String),

    // ===== Transport Errors =====
    #[error("Transport error: {0}")]
    Transport(String),

    // ===== Ambient Errors =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Standard JSON-RPC 2.0 error codes.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl Error {
    /// Shorthand for a registration failure.
    pub fn registration(msg: impl Into<String>) -> Self {
        Self::Registration(msg.into())
    }

    /// Shorthand for an illegal lifecycle transition.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// The JSON-RPC error code this error maps to on the wire.
    ///
    /// The reserved codes cover the envelope/dispatch taxonomy; everything
    /// else is surfaced as an internal error with a descriptive message.
    pub fn jsonrpc_code(&self) -> i32 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            _ => codes::INTERNAL_ERROR,
        }
    }

    /// Whether this error came from the request itself rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::InvalidRequest(_)
                | Self::MethodNotFound(_)
                | Self::InvalidParams(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let parse = Error::Parse("unexpected end of input".to_string());
        assert_eq!(parse.to_string(), "Parse error: unexpected end of input");

        let missing = Error::MethodNotFound("tools/unknown".to_string());
        assert_eq!(missing.to_string(), "Method not found: tools/unknown");

        let reg = Error::registration("duplicate name: echo");
        assert_eq!(reg.to_string(), "Registration error: duplicate name: echo");
    }

    #[test]
    fn test_jsonrpc_code_mapping() {
        assert_eq!(Error::Parse(String::new()).jsonrpc_code(), -32700);
        assert_eq!(Error::InvalidRequest(String::new()).jsonrpc_code(), -32600);
        assert_eq!(Error::MethodNotFound(String::new()).jsonrpc_code(), -32601);
        assert_eq!(Error::InvalidParams(String::new()).jsonrpc_code(), -32602);

        // Everything else is internal.
        assert_eq!(Error::registration("dup").jsonrpc_code(), -32603);
        assert_eq!(Error::state("bad").jsonrpc_code(), -32603);
        assert_eq!(Error::Transport("closed".into()).jsonrpc_code(), -32603);
        assert_eq!(Error::Encoding("cycle".into()).jsonrpc_code(), -32603);
        assert_eq!(Error::Internal("boom".into()).jsonrpc_code(), -32603);
    }

    #[test]
    fn test_is_client_error() {
        assert!(Error::Parse(String::new()).is_client_error());
        assert!(Error::InvalidParams(String::new()).is_client_error());
        assert!(!Error::registration("dup").is_client_error());
        assert!(!Error::Transport("down".into()).is_client_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.jsonrpc_code(), -32603);
    }
}
