use thiserror::Error;

/// Unified error type for aurelian operations.
///
/// Variants map onto the conceptual error kinds the store and sync layers
/// agree on: callers can retry `Conflict` and `Timeout`, while `Corrupt` is
/// terminal for the affected workspace.
#[derive(Debug, Error)]
pub enum AuError {
    /// General error for any kind of I/O issue not otherwise documented here.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A workspace, todo or comment does not exist.
    ///
    /// Callers render this as a 404 or a user-facing "does not exist"
    /// message; it never indicates a partial mutation.
    #[error("{kind} with id '{id}' does not exist")]
    NotFound {
        /// Entity kind ("workspace", "todo" or "comment")
        kind: &'static str,
        /// The identifier that failed to resolve
        id: String,
    },

    /// A validator rejected the input before any state was touched.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field that failed validation
        field: &'static str,
        /// What rule was violated
        reason: String,
    },

    /// The workspace is locked for writing by another process, or an import
    /// target already exists.
    #[error("{0}")]
    Conflict(String),

    /// A serialized document failed to load or failed root schema checks.
    ///
    /// This is terminal for the workspace file in question; the caller
    /// should not retry.
    #[error("corrupt workspace document: {0}")]
    Corrupt(String),

    /// A sync I/O deadline expired.
    #[error("sync timed out: {0}")]
    Timeout(String),

    /// The ambient cancellation signal fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Error from the CRDT runtime.
    #[error("automerge error: {0}")]
    Automerge(#[from] automerge::AutomergeError),

    /// Transport-level sync error (connection, framing, handshake).
    #[error("sync transport error: {0}")]
    Transport(String),
}

impl AuError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        AuError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        AuError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this error should be surfaced as a retryable conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AuError::Conflict(_))
    }

    /// Whether this error means the target entity is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AuError::NotFound { .. })
    }
}

/// Result type alias for aurelian operations
pub type Result<T> = std::result::Result<T, AuError>;
