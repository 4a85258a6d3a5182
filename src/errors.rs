use thiserror::Error;

// Errors raised while querying or applying a GPU power limit.
// Every variant is recoverable: callers turn it into a fallback
// value or an unapplied result instead of aborting
#[derive(Debug, Error)]
pub enum PowerLimitError {
    #[error("\"{tool}\" not found in PATH")]
    ToolNotFound { tool: String },

    #[error("\"{tool}\" failed: {detail}")]
    CommandFailed {
        tool: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("missing admin/root privileges")]
    PermissionDenied,

    #[error("unparsable power limit output: \"{output}\"")]
    Parse { output: String },

    #[error("invalid power limit request: {reason}")]
    InvalidRequest { reason: String },
}
