//! Ordered byte sinks.
//!
//! Both sides of a session write through a bounded queue drained by a single
//! task, so at most one write per sink is in flight and writes complete in
//! the order they were queued.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use webserial_core::error::{Error, Result};

/// Terminal-facing output queue.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Bytes>,
}

impl Outbound {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Queue bytes for the terminal. Empty writes are skipped.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        if data.is_empty() {
            return Ok(());
        }
        self.tx.send(data).await.map_err(|_| Error::ConnectionClosed)
    }

    /// Queue bytes only if there is room right now.
    pub fn try_send(&self, data: impl Into<Bytes>) -> bool {
        let data = data.into();
        data.is_empty() || self.tx.try_send(data).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drain `rx` into `sink`, one write at a time, until the queue closes or a
/// write fails.
pub fn spawn_writer<W>(mut sink: W, mut rx: mpsc::Receiver<Bytes>, label: &'static str) -> JoinHandle<Result<()>>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            trace!(sink = label, len = chunk.len(), "write");
            sink.write_all(&chunk).await?;
            sink.flush().await?;
        }
        debug!(sink = label, "writer queue closed");
        let _ = sink.shutdown().await;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn try_send_never_waits() {
        let (tx, mut rx) = mpsc::channel(1);
        let out = Outbound::new(tx);
        assert!(out.try_send("a"));
        assert!(!out.try_send("b"));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"a"));
        assert!(out.try_send("c"));
    }

    #[tokio::test]
    async fn writes_arrive_in_order() {
        let (tx, rx) = mpsc::channel(8);
        let (near, mut far) = tokio::io::duplex(64);
        let writer = spawn_writer(near, rx, "test");

        for chunk in ["one ", "two ", "three"] {
            tx.send(Bytes::from_static(chunk.as_bytes())).await.unwrap();
        }
        drop(tx);
        writer.await.unwrap().unwrap();

        let mut out = String::new();
        far.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "one two three");
    }

    #[tokio::test]
    async fn send_after_close_is_connection_closed() {
        let (tx, rx) = mpsc::channel(1);
        let out = Outbound::new(tx);
        drop(rx);
        assert!(out.is_closed());
        assert!(matches!(out.send("x").await, Err(Error::ConnectionClosed)));
        out.send(Bytes::new()).await.unwrap();
    }
}
