//! Background delivery of encoded events.
//!
//! The [`Worker`] owns the drain side of the channel fed by
//! [`EventHandler`]s. Events are buffered and written in batches, on a
//! ticker, when the buffer is full, or on an explicit [`Worker::flush`].
//! [`Worker::close`] stops the loop, waits for it, flushes what is left
//! and closes the writer, in that order.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::EventError;
use crate::handler::EventHandler;
use crate::metrics::EventMetrics;
use crate::writer::Writer;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub batch_interval: Duration,
    /// Buffered events that force a flush before the next tick.
    pub buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_secs(5),
            buffer_size: 1000,
        }
    }
}

type FlushRequest = oneshot::Sender<Result<(), EventError>>;

#[derive(Debug)]
pub struct Worker {
    flush_tx: mpsc::Sender<FlushRequest>,
    cancel_token: CancellationToken,
    drain_loop: JoinHandle<Result<(), EventError>>,
}

struct DrainLoop {
    writer: Box<dyn Writer>,
    events_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    flush_rx: mpsc::Receiver<FlushRequest>,
    buffer: Vec<Vec<u8>>,
    config: WorkerConfig,
    metrics: EventMetrics,
}

impl Worker {
    /// Spawns the drain loop and returns it together with the handler that
    /// feeds it. Must be called inside a tokio runtime.
    pub fn start(
        writer: Box<dyn Writer>,
        config: WorkerConfig,
        metrics: EventMetrics,
    ) -> (Self, EventHandler) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (flush_tx, flush_rx) = mpsc::channel(8);
        let cancel_token = CancellationToken::new();

        let drain = DrainLoop {
            writer,
            events_rx,
            flush_rx,
            buffer: Vec::with_capacity(config.buffer_size),
            config,
            metrics: metrics.clone(),
        };
        let drain_loop = tokio::spawn(drain.run(cancel_token.clone()));

        let worker = Self {
            flush_tx,
            cancel_token,
            drain_loop,
        };
        (worker, EventHandler::new(events_tx, metrics))
    }

    /// Writes out everything handed to any handler before this call.
    pub async fn flush(&self) -> Result<(), EventError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.flush_tx
            .send(ack_tx)
            .await
            .map_err(|_| EventError::Closed)?;
        ack_rx.await.map_err(|_| EventError::Closed)?
    }

    pub async fn close(self) -> Result<(), EventError> {
        self.cancel_token.cancel();
        match self.drain_loop.await {
            Ok(result) => result,
            Err(err) => Err(EventError::Worker(err.to_string())),
        }
    }
}

impl DrainLoop {
    async fn run(mut self, cancel_token: CancellationToken) -> Result<(), EventError> {
        let mut ticker = interval(self.config.batch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    debug!("event worker cancelled");
                    break;
                }

                Some(ack) = self.flush_rx.recv() => {
                    self.drain_pending();
                    let _ = ack.send(self.flush().await);
                }

                Some(event) = self.events_rx.recv() => {
                    self.buffer.push(event);
                    if self.buffer.len() >= self.config.buffer_size {
                        let _ = self.flush().await;
                    }
                }

                _ = ticker.tick() => {
                    let _ = self.flush().await;
                }
            }
        }

        self.events_rx.close();
        self.drain_pending();
        let flushed = self.flush().await;
        let closed = self.writer.close().await;
        info!("event worker stopped");
        flushed.and(closed)
    }

    fn drain_pending(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.buffer.push(event);
        }
    }

    async fn flush(&mut self) -> Result<(), EventError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len() as u64;
        match self.writer.write(batch).await {
            Ok(()) => {
                debug!(events = count, "flushed events");
                Ok(())
            }
            Err(err) => {
                error!(events = count, error = %err, "cannot write events, dropping batch");
                self.metrics.dropped(count);
                Err(err)
            }
        }
    }
}
