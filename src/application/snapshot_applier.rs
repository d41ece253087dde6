//! Snapshot Applier
//!
//! Glue between the decoder and the target: each decoded entry is translated
//! and every resulting command is delivered before the next entry is taken.

use crate::domain::entities::{SnapshotEntry, SnapshotStats};
use crate::domain::errors::SessionError;
use crate::domain::ports::{Connector, SnapshotHandler};
use crate::domain::services::{CommandTranslator, TranslatorOptions};
use crate::infrastructure::resilient_sender::ResilientSender;
use async_trait::async_trait;

/// Applies decoded snapshot entries to the target.
pub struct SnapshotApplier<'a, C: Connector> {
    translator: CommandTranslator,
    sender: &'a mut ResilientSender<C>,
    stats: SnapshotStats,
}

impl<'a, C: Connector> SnapshotApplier<'a, C> {
    pub fn new(options: TranslatorOptions, sender: &'a mut ResilientSender<C>) -> Self {
        Self {
            translator: CommandTranslator::new(options),
            sender,
            stats: SnapshotStats::default(),
        }
    }

    pub fn stats(&self) -> SnapshotStats {
        self.stats
    }

    /// Confirm the snapshot was applied in full.
    pub fn finish(self) -> Result<SnapshotStats, SessionError> {
        if !self.translator.is_complete() {
            return Err(SessionError::decode("snapshot ended before end marker"));
        }
        Ok(self.stats)
    }
}

#[async_trait]
impl<'a, C: Connector> SnapshotHandler for SnapshotApplier<'a, C> {
    async fn handle(&mut self, entry: SnapshotEntry) -> Result<(), SessionError> {
        match &entry {
            SnapshotEntry::Begin => tracing::info!("applying snapshot"),
            SnapshotEntry::SelectDb(db) => tracing::debug!("snapshot selects database {}", db),
            SnapshotEntry::End => tracing::debug!(
                "end of snapshot after {} entries",
                self.translator.entries() + 1
            ),
            _ => {}
        }

        let commands = self.translator.translate(entry)?;
        self.stats.entries = self.translator.entries();

        for command in commands {
            self.sender.send(&command).await;
            self.stats.commands += 1;
            self.stats.bytes_sent += command.len() as u64;
        }

        if self.stats.entries % 100_000 == 0 {
            tracing::debug!(
                "snapshot progress: {} entries, {} commands",
                self.stats.entries,
                self.stats.commands
            );
        }
        Ok(())
    }
}
