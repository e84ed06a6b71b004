//! TCP accept loop and per-connection request/response pump.
//!
//! State machine per connection: `Accepted -> Reading -> Handling ->
//! Writing -> Reading ...`, terminating on I/O error, EOF, idle
//! timeout, an over-size line, or a write failure. A panic inside a
//! connection task is isolated by `tokio::spawn`'s own unwind boundary:
//! it fails only that task's `JoinHandle`, never the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NetworkSettings;
use crate::error::{Error, Result};
use crate::protocol::Executor;

/// Binds a listener and enforces a connection cap via a counting gate.
pub struct TcpServer {
    listener: TcpListener,
    gate: Option<Arc<Semaphore>>,
    max_message_size: usize,
    idle_timeout: Duration,
}

impl TcpServer {
    /// Binds `network.address`. `max_connections == 0` disables the gate
    /// (unlimited concurrent connections).
    pub async fn new(network: &NetworkSettings) -> Result<Self> {
        let listener = TcpListener::bind(&network.address).await?;
        let gate = if network.max_connections == 0 {
            None
        } else {
            Some(Arc::new(Semaphore::new(network.max_connections as usize)))
        };

        Ok(Self {
            listener,
            gate,
            max_message_size: network.max_message_size.as_u64() as usize,
            idle_timeout: network.idle_timeout,
        })
    }

    /// The address actually bound, useful when `network.address` asks
    /// for an ephemeral port (`:0`).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Exits as soon as `cancel` fires, then waits for every
    /// in-flight connection worker to finish (they keep running until
    /// their next failed read) before returning.
    pub async fn serve(self, cancel: CancellationToken, executor: Arc<Executor>) {
        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let permit = match &self.gate {
                Some(gate) => match Arc::clone(gate).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => break,
                },
                None => None,
            };

            let executor = Arc::clone(&executor);
            let cancel = cancel.clone();
            let max_message_size = self.max_message_size;
            let idle_timeout = self.idle_timeout;

            connections.spawn(async move {
                let _permit = permit;
                if let Err(e) =
                    handle_connection(stream, peer, &executor, &cancel, max_message_size, idle_timeout)
                        .await
                {
                    debug!(%peer, error = %e, "connection closed");
                }
            });
        }

        info!(
            in_flight = connections.len(),
            "accept loop exiting on cancellation, draining in-flight connections"
        );
        while connections.join_next().await.is_some() {}
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    executor: &Executor,
    cancel: &CancellationToken,
    max_message_size: usize,
    idle_timeout: Duration,
) -> Result<()> {
    let (reader_half, mut writer_half) = stream.into_split();
    let mut reader = BufReader::new(reader_half);
    let mut line = String::new();

    loop {
        line.clear();

        let read_outcome = if idle_timeout.is_zero() {
            reader.read_line(&mut line).await
        } else {
            match tokio::time::timeout(idle_timeout, reader.read_line(&mut line)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    debug!(%peer, "idle timeout, closing connection");
                    return Ok(());
                }
            }
        };

        let bytes_read = match read_outcome {
            Ok(0) => return Ok(()), // EOF
            Ok(n) => n,
            Err(e) => return Err(Error::IOFailure(e)),
        };

        if bytes_read >= max_message_size {
            warn!(%peer, bytes_read, max_message_size, "request exceeds max_message_size");
            return Ok(());
        }

        let request = line.trim_end_matches(['\n', '\r']);
        let response = match executor.execute(cancel, request).await {
            Ok(response) => response,
            Err(e) => format!("error: {e}"),
        };

        if let Err(e) = writer_half
            .write_all(format!("{response}\n").as_bytes())
            .await
        {
            return Err(Error::IOFailure(e));
        }
    }
}
