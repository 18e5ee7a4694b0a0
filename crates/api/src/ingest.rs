//! Supervision of the UDP listener task.
//!
//! A listener that stops on its own error cancels the shared shutdown
//! token, and the process exits non-zero once cleanup has finished.

use radarops_ingest::{IngestError, UdpListener};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

pub type ListenerOutcome = Result<Result<(), IngestError>, JoinError>;

/// Run `listener` in the background until `shutdown` fires or it fails.
pub fn spawn_listener(
    listener: UdpListener,
    shutdown: CancellationToken,
) -> JoinHandle<Result<(), IngestError>> {
    tokio::spawn(async move {
        let result = listener.run(shutdown.clone()).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "UDP listener failed, shutting down");
            shutdown.cancel();
        }
        result
    })
}

/// Process exit status for a finished listener task.
pub fn exit_code(outcome: &ListenerOutcome) -> i32 {
    match outcome {
        Ok(Ok(())) => 0,
        Ok(Err(_)) => 1,
        Err(e) => {
            tracing::error!(error = %e, "UDP listener task aborted");
            1
        }
    }
}
