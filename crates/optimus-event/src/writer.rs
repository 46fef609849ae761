//! Sinks for encoded events.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::EventError;

/// Destination for batches of encoded events. Owned by the worker.
#[async_trait]
pub trait Writer: Send {
    async fn write(&mut self, batch: Vec<Vec<u8>>) -> Result<(), EventError>;

    async fn close(&mut self) -> Result<(), EventError>;
}

/// Records batch sizes to the log. Used when no sink is configured.
#[derive(Debug, Default)]
pub struct LogWriter {
    written: u64,
}

#[async_trait]
impl Writer for LogWriter {
    async fn write(&mut self, batch: Vec<Vec<u8>>) -> Result<(), EventError> {
        let bytes: usize = batch.iter().map(Vec::len).sum();
        self.written += batch.len() as u64;
        info!(events = batch.len(), bytes, "event batch written");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EventError> {
        info!(total = self.written, "event log writer closed");
        Ok(())
    }
}

/// Forwards every event to an in-process receiver. Closing the writer
/// closes the channel.
#[derive(Debug)]
pub struct ChannelWriter {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl ChannelWriter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl Writer for ChannelWriter {
    async fn write(&mut self, batch: Vec<Vec<u8>>) -> Result<(), EventError> {
        let tx = self.tx.as_ref().ok_or(EventError::Closed)?;
        for event in batch {
            tx.send(event)
                .map_err(|_| EventError::Write("receiver dropped".into()))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EventError> {
        self.tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_writer_forwards_then_closes() {
        let (mut writer, mut rx) = ChannelWriter::new();
        writer.write(vec![vec![1], vec![2]]).await.unwrap();
        writer.close().await.unwrap();

        assert_eq!(rx.recv().await, Some(vec![1]));
        assert_eq!(rx.recv().await, Some(vec![2]));
        assert_eq!(rx.recv().await, None);
        assert!(matches!(
            writer.write(vec![vec![3]]).await,
            Err(EventError::Closed)
        ));
    }
}
