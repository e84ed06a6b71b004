//! Orders WAL-append before Engine-mutate and drives crash recovery.
//!
//! `Storage` depends on an `Engine` capability and, optionally, a `Wal`
//! capability: when no WAL is configured, `Storage` skips both `Push`
//! and recovery, and every other operation behaves the same.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::commands::{Command, CommandKind};
use crate::wal::Wal;

pub struct Storage {
    engine: Arc<Engine>,
    wal: Option<Arc<Wal>>,
}

impl Storage {
    pub fn new(engine: Arc<Engine>, wal: Arc<Wal>) -> Self {
        Self {
            engine,
            wal: Some(wal),
        }
    }

    /// Builds a `Storage` with no WAL capability: `set`/`delete` skip
    /// `Push` entirely and `start` skips recovery.
    pub fn without_wal(engine: Arc<Engine>) -> Self {
        Self { engine, wal: None }
    }

    /// Aborts immediately if `cancel` already fired. Otherwise replays
    /// every recovered SET/DEL record into the engine (GET records never
    /// appear on disk) and starts the WAL's flusher task, returning its
    /// `JoinHandle` (`None` when no WAL is configured) so a caller can
    /// await the flusher's final drain before the process exits.
    pub async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<tokio::task::JoinHandle<()>>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Some(wal) = &self.wal else {
            return Ok(None);
        };

        let records = wal.load_records()?;
        info!(count = records.len(), "replaying recovered WAL records");
        for command in records {
            match command.kind {
                CommandKind::Set => {
                    self.engine
                        .set(command.key().to_string(), command.value().to_string());
                }
                CommandKind::Del => self.engine.delete(command.key()),
                CommandKind::Get => {}
            }
        }

        let handle = wal.start(cancel).await?;
        Ok(Some(handle))
    }

    pub async fn get(&self, cancel: &CancellationToken, key: &str) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.engine.get(key)
    }

    /// Pushes the encoded SET record to the WAL (if configured) and
    /// waits for it to be durable before mutating the engine.
    pub async fn set(&self, cancel: &CancellationToken, key: String, value: String) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(wal) = &self.wal {
            let command = Command::new(CommandKind::Set, vec![key.clone(), value.clone()])?;
            wal.push(command.to_wal_line()).await?;
        }

        self.engine.set(key, value);
        Ok(())
    }

    /// Symmetric to `set`: pushes the encoded DEL record, then deletes.
    pub async fn delete(&self, cancel: &CancellationToken, key: &str) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if let Some(wal) = &self.wal {
            let command = Command::new(CommandKind::Del, vec![key.to_string()])?;
            wal.push(command.to_wal_line()).await?;
        }

        self.engine.delete(key);
        Ok(())
    }
}
