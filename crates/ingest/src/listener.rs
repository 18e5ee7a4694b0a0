//! UDP receive loop.
//!
//! The loop never awaits processing: each datagram is pushed onto a bounded
//! queue with `try_send`. A dispatcher drains the queue and runs every
//! datagram on its own task, bounded by a semaphore and tracked for
//! shutdown. A full queue drops the datagram and counts an overflow.
//! Violations waiting for a late capture hand their permit back, and are
//! released when the loop stops so draining does not wait them out.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use radarops_events::RadarEvent;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::{Datagram, DatagramOutcome, Pipeline};

/// Largest possible UDP payload.
const MAX_DATAGRAM_SIZE: usize = 65_535;

pub struct UdpListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    queue_capacity: usize,
    workers: usize,
}

impl UdpListener {
    /// Bind the socket. Failure here is fatal for the listener.
    pub async fn bind(config: &IngestConfig, pipeline: Arc<Pipeline>) -> Result<Self, IngestError> {
        let addr = config.udp_bind_addr;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| IngestError::Bind { addr, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| IngestError::Bind { addr, source })?;

        Ok(Self {
            socket,
            local_addr,
            pipeline,
            queue_capacity: config.queue_capacity.max(1),
            workers: config.workers.max(1),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive until `cancel` fires or the socket fails.
    ///
    /// On return the queue has been drained, in-flight datagrams have
    /// finished and the socket is closed.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), IngestError> {
        let Self {
            socket,
            local_addr,
            pipeline,
            queue_capacity,
            workers,
        } = self;
        let stats = Arc::clone(pipeline.stats());
        let bus = Arc::clone(pipeline.bus());

        let (tx, rx) = mpsc::channel::<Datagram>(queue_capacity);
        let dispatcher = tokio::spawn(dispatch(rx, Arc::clone(&pipeline), workers));

        stats.set_listening(true);
        bus.publish(RadarEvent::listener_started(local_addr));
        tracing::info!(addr = %local_addr, queue_capacity, workers, "UDP listener started");

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                received = socket.recv_from(&mut buf) => {
                    let (len, source) = match received {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::error!(addr = %local_addr, error = %e, "UDP receive failed");
                            break Err(IngestError::Socket(e));
                        }
                    };
                    stats.record_received();
                    let datagram = Datagram::new(&buf[..len], source, Utc::now());
                    match tx.try_send(datagram) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(dropped)) => {
                            stats.record_queue_overflow();
                            tracing::warn!(
                                source = %dropped.source,
                                bytes = dropped.payload.len(),
                                "Ingest queue full, datagram dropped",
                            );
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            break Err(IngestError::QueueClosed);
                        }
                    }
                }
            }
        };

        stats.set_listening(false);
        drop(socket);
        drop(tx);
        pipeline.release_holds();
        tracing::info!(addr = %local_addr, "UDP listener stopped receiving, draining queue");

        if let Err(e) = dispatcher.await {
            tracing::error!(error = %e, "Datagram dispatcher panicked");
        }

        bus.publish(RadarEvent::listener_stopped());
        tracing::info!(addr = %local_addr, "UDP listener shut down");
        result
    }
}

/// Drain the queue, processing at most `workers` datagrams at once.
async fn dispatch(mut rx: mpsc::Receiver<Datagram>, pipeline: Arc<Pipeline>, workers: usize) {
    let semaphore = Arc::new(Semaphore::new(workers));
    let tracker = TaskTracker::new();

    while let Some(datagram) = rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let pipeline = Arc::clone(&pipeline);
        tracker.spawn(async move {
            let source = datagram.source;
            match pipeline.handle_with_permit(datagram, permit).await {
                Ok(DatagramOutcome::Violation { reading, fine, .. }) => {
                    tracing::trace!(%source, reading_id = reading.0, fine_id = fine.id, "Datagram processed");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(%source, error = %e, "Failed to process datagram");
                }
            }
        });
    }

    tracker.close();
    tracker.wait().await;
}
