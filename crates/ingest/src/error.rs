use radarops_core::error::PersistenceError;

/// Failure while processing one datagram.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Fatal listener failure, returned to whoever supervises the listener.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("UDP socket error: {0}")]
    Socket(#[source] std::io::Error),

    #[error("Datagram queue closed unexpectedly")]
    QueueClosed,
}

/// Invalid environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(var: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
