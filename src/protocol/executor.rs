//! Purely functional translation from a textual request line to a
//! response line: parse → validate → dispatch to `Storage` → format.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::commands::{Command, CommandKind};
use crate::storage::Storage;

/// Stateless dispatcher sitting between the connection loop and `Storage`.
pub struct Executor {
    storage: Arc<Storage>,
}

impl Executor {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Parses one request line and returns the response line to send
    /// back, or an error to be surfaced to the client as a diagnostic.
    pub async fn execute(&self, cancel: &CancellationToken, line: &str) -> Result<String> {
        let command = Command::parse_request(line)?;
        debug!(kind = ?command.kind, "executing command");

        match command.kind {
            CommandKind::Get => match self.storage.get(cancel, command.key()).await {
                Ok(value) if value.is_empty() => Ok("empty".to_string()),
                Ok(value) => Ok(format!("result: {value}")),
                Err(Error::KeyNotFound) => Ok("no data".to_string()),
                Err(e) => Err(e),
            },
            CommandKind::Set => {
                self.storage
                    .set(cancel, command.key().to_string(), command.value().to_string())
                    .await?;
                Ok("ok".to_string())
            }
            CommandKind::Del => {
                self.storage.delete(cancel, command.key()).await?;
                Ok("ok".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use tempfile::tempdir;

    async fn executor_without_wal() -> Executor {
        let storage = Storage::without_wal(Arc::new(Engine::new()));
        Executor::new(Arc::new(storage))
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let executor = executor_without_wal().await;
        let cancel = CancellationToken::new();

        assert_eq!(
            executor.execute(&cancel, "SET foo bar").await.unwrap(),
            "ok"
        );
        assert_eq!(
            executor.execute(&cancel, "GET foo").await.unwrap(),
            "result: bar"
        );
        assert_eq!(executor.execute(&cancel, "DEL foo").await.unwrap(), "ok");
        assert_eq!(
            executor.execute(&cancel, "GET foo").await.unwrap(),
            "no data"
        );
    }

    #[tokio::test]
    async fn get_on_missing_key_is_no_data_not_an_error() {
        let executor = executor_without_wal().await;
        let cancel = CancellationToken::new();
        assert_eq!(
            executor.execute(&cancel, "GET missing").await.unwrap(),
            "no data"
        );
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let executor = executor_without_wal().await;
        let cancel = CancellationToken::new();
        executor.execute(&cancel, "SET a b").await.unwrap();
        executor.execute(&cancel, "SET a c").await.unwrap();
        assert_eq!(
            executor.execute(&cancel, "GET a").await.unwrap(),
            "result: c"
        );
    }

    #[tokio::test]
    async fn malformed_request_is_reported_but_connection_semantics_are_the_callers() {
        let executor = executor_without_wal().await;
        let cancel = CancellationToken::new();
        assert!(executor.execute(&cancel, "SET k").await.is_err());
        // a following well-formed request on the same executor still works
        assert_eq!(
            executor.execute(&cancel, "SET k v").await.unwrap(),
            "ok"
        );
    }

    #[tokio::test]
    async fn cancellation_aborts_before_touching_storage() {
        let dir = tempdir().unwrap();
        let _ = &dir; // keep alive, unused in the no-wal path
        let executor = executor_without_wal().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            executor.execute(&cancel, "GET foo").await,
            Err(Error::Cancelled)
        ));
    }
}
