//! Migration Service - Session supervisor
//!
//! Runs migration sessions back to back. A session dials both instances,
//! performs the handshake, applies the snapshot and then tails the live
//! stream. Any session failure closes both links, waits the retry backoff
//! and starts over with a full resync.

use crate::application::snapshot_applier::SnapshotApplier;
use crate::config::Config;
use crate::domain::entities::SnapshotStats;
use crate::domain::errors::SessionError;
use crate::domain::ports::{Connector, SnapshotDecoder};
use crate::infrastructure::resilient_sender::ResilientSender;
use crate::infrastructure::shutdown::ShutdownController;
use crate::replication::{
    forward_live_stream, read_snapshot_length, request_sync, stream_snapshot, SessionBuffer,
};
use std::sync::Arc;
use tracing::Instrument;

/// Session supervisor: one active session at a time, full resync on failure.
pub struct MigrationService<C: Connector, D: SnapshotDecoder> {
    config: Config,
    connector: Arc<C>,
    decoder: Arc<D>,
    shutdown: ShutdownController,
}

impl<C: Connector, D: SnapshotDecoder> MigrationService<C, D> {
    pub fn new(
        config: Config,
        connector: Arc<C>,
        decoder: Arc<D>,
        shutdown: ShutdownController,
    ) -> Self {
        Self {
            config,
            connector,
            decoder,
            shutdown,
        }
    }

    /// Run sessions until shutdown. Returns the number of sessions started.
    pub async fn run(&self) -> u64 {
        tracing::info!(
            "starting migration from {} to {}",
            self.config.from,
            self.config.to
        );
        let backoff = self.config.retry_backoff();
        let mut attempt: u64 = 0;

        loop {
            if self.shutdown.is_shutdown() {
                break;
            }
            attempt += 1;

            let span = tracing::info_span!("session", attempt);
            let outcome = tokio::select! {
                result = self.run_session().instrument(span) => result,
                _ = self.shutdown.wait() => break,
            };

            match outcome {
                Ok(()) => tracing::info!("session {} ended", attempt),
                Err(e) => tracing::warn!(
                    "session {} failed: {}; resyncing in {}s",
                    attempt,
                    e,
                    backoff.as_secs()
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.shutdown.wait() => break,
            }
        }

        tracing::info!("migration stopped after {} session(s)", attempt);
        attempt
    }

    /// One session. Only returns once a stage has failed.
    async fn run_session(&self) -> Result<(), SessionError> {
        let mut source = self.connector.connect_source(&self.config.from).await?;
        let mut sender = ResilientSender::connect(
            self.connector.clone(),
            self.config.to.clone(),
            self.config.reconnect_delay(),
        )
        .await?;
        let mut buffer = SessionBuffer::new();

        request_sync(&mut source).await?;
        let length = read_snapshot_length(&mut source, &mut buffer).await?;

        let stats = self
            .transfer_snapshot(&mut source, &mut buffer, &mut sender, length)
            .await?;
        tracing::info!(
            "snapshot applied: {} entries, {} commands, {} bytes",
            stats.entries,
            stats.commands,
            stats.bytes_sent
        );

        forward_live_stream(&mut source, &mut buffer, &mut sender).await
    }

    /// Stream the snapshot into the pipe while decoding and applying it.
    ///
    /// Both flows run on this task. A failing source is reported ahead of
    /// the decode error it causes; a failing decoder is reported ahead of
    /// the closed pipe it leaves behind.
    async fn transfer_snapshot(
        &self,
        source: &mut C::Source,
        buffer: &mut SessionBuffer,
        sender: &mut ResilientSender<C>,
        length: u64,
    ) -> Result<SnapshotStats, SessionError> {
        let (pipe_writer, pipe_reader) = tokio::io::duplex(self.config.pipe_capacity);
        let options = self.config.translator_options();
        let decoder = &self.decoder;

        let streaming = stream_snapshot(source, buffer, length, pipe_writer);
        // The reader is owned by the decode future and dropped with it, so a
        // streamer blocked on a full pipe sees it closed.
        let applying = async move {
            let mut pipe_reader = pipe_reader;
            let mut applier = SnapshotApplier::new(options, sender);
            decoder.decode(&mut pipe_reader, &mut applier).await?;
            applier.finish()
        };

        match tokio::join!(streaming, applying) {
            (Err(e), _) if !matches!(e, SessionError::HandOffClosed) => Err(e),
            (_, Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Ok(_), Ok(stats)) => Ok(stats),
        }
    }
}
