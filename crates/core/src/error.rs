/// Boxed error used to carry backend failures across the port boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Why a datagram could not be turned into a reading.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    /// No supported wire format matched the payload structurally.
    #[error("Unrecognized message format")]
    UnrecognizedFormat,

    /// A format matched but one of its fields is unusable.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ParseError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// A persistence collaborator failed.
///
/// The core never retries; the error is propagated to whoever drives the
/// pipeline.
#[derive(Debug, thiserror::Error)]
#[error("Persistence operation '{operation}' failed: {source}")]
pub struct PersistenceError {
    pub operation: &'static str,
    #[source]
    pub source: BoxError,
}

impl PersistenceError {
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Why a capture lookup produced no usable answer.
///
/// The correlator degrades both variants to "no match".
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("Capture lookup timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Lookup(#[from] PersistenceError),
}
