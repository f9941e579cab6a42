//! Parse error taxonomy.

use thiserror::Error;

/// Why a text frame failed to parse under a given protocol.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("packet missing required `cmd` field")]
    MissingCommand,

    #[error("packet missing required `method` field")]
    MissingMethod,

    #[error("unrecognized CL2 frame")]
    MalformedCl2,
}
