// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching sender built as a single-flusher actor.
//!
//! ```text
//!    ┌──────────────┐
//!    │ BatchSender  │ (send from any thread)
//!    └──────┬───────┘
//!           │ commands via unbounded channel
//!           v
//!    ┌──────────────┐
//!    │ BatchService │ owns the buffer; flushes on count, tick, or close
//!    └──────┬───────┘
//!           │ one chunk at a time
//!           v
//!    ┌──────────────┐
//!    │  Transport   │
//!    └──────────────┘
//! ```
//!
//! The service is the only owner of the buffer and the only caller of
//! `Transport::send`, so flushes never overlap and chunks reach the transport
//! in enqueue order. `send` never waits for a flush: payloads queue in the
//! channel while a flush is in progress.
//!
//! Loop states: `Running` waits for a command, a tick, or cancellation.
//! On cancellation it moves to `Draining`, which takes every payload still in
//! the channel, flushes once, and stops.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::chunker::Chunks;
use crate::constants::{MESSAGE_MAX_SIZE, MESSAGE_SEPARATOR};
use crate::error::{ConfigError, DeliveryError, ErrorSink, FlushError, SendError, TransportError};
use crate::sender::Sender;
use crate::transport::Transport;

#[derive(Debug)]
pub(crate) enum BatchCommand {
    /// Append one payload to the buffer.
    Push(String),
    /// Flush now and acknowledge once the flush is over.
    Flush(oneshot::Sender<()>),
}

/// Batching parameters, fixed for the lifetime of a sender.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Buffered payloads that trigger an immediate flush. `0` and `1` flush
    /// on every payload.
    pub batch_size: usize,
    /// Period of the flush timer. Zero disables the timer.
    pub flush_interval: Duration,
    pub max_chunk_size: usize,
    pub separator: String,
}

impl BatchConfig {
    #[must_use]
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        BatchConfig {
            batch_size,
            flush_interval,
            max_chunk_size: MESSAGE_MAX_SIZE,
            separator: MESSAGE_SEPARATOR.to_string(),
        }
    }
}

pub(crate) struct BatchService {
    transport: Arc<dyn Transport>,
    config: BatchConfig,
    buffer: Vec<String>,
    rx: mpsc::UnboundedReceiver<BatchCommand>,
    cancel_token: CancellationToken,
    error_sink: ErrorSink,
}

impl BatchService {
    pub async fn run(mut self) {
        debug!(
            "TELEGRAM | Batch sender started: batch_size={} flush_interval={:?}",
            self.config.batch_size, self.config.flush_interval
        );

        let mut ticker = self.ticker();

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!("TELEGRAM | Received shutdown signal, draining pending payloads");
                    break;
                }
                Some(command) = self.rx.recv() => {
                    self.handle(command).await;
                }
                () = tick(&mut ticker) => {
                    self.flush().await;
                }
            }
        }

        // Draining: nothing new can arrive once the receiver is closed.
        self.rx.close();
        let mut acks = Vec::new();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                BatchCommand::Push(payload) => self.buffer.push(payload),
                BatchCommand::Flush(ack) => acks.push(ack),
            }
        }
        self.flush().await;
        for ack in acks {
            let _ = ack.send(());
        }

        debug!("TELEGRAM | Batch sender stopped");
    }

    async fn handle(&mut self, command: BatchCommand) {
        match command {
            BatchCommand::Push(payload) => {
                self.buffer.push(payload);
                if self.buffer.len() >= self.config.batch_size {
                    self.flush().await;
                }
            }
            BatchCommand::Flush(ack) => {
                self.flush().await;
                if ack.send(()).is_err() {
                    debug!("TELEGRAM | Flush requester dropped before acknowledgement");
                }
            }
        }
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let payloads = std::mem::take(&mut self.buffer);
        let n_payloads = payloads.len();
        debug!("TELEGRAM | Flushing {n_payloads} payloads");

        if let Err(e) = send_chunks(self.transport.as_ref(), &self.config, payloads).await {
            (self.error_sink)(&DeliveryError::Flush(e));
        }
    }

    fn ticker(&self) -> Option<Interval> {
        let period = self.config.flush_interval;
        if period.is_zero() {
            return None;
        }
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(ticker)
    }
}

/// Sends the chunks of `payloads` in order, stopping at the first failure.
async fn send_chunks(
    transport: &dyn Transport,
    config: &BatchConfig,
    payloads: Vec<String>,
) -> Result<(), FlushError> {
    let mut chunks = Chunks::new(payloads, &config.separator, config.max_chunk_size);
    let mut sent = 0;

    while let Some(chunk) = chunks.next() {
        if let Err(source) = transport.send(&chunk).await {
            return Err(FlushError {
                sent,
                total: sent + 1 + chunks.count(),
                source,
            });
        }
        sent += 1;
    }

    debug!("TELEGRAM | Successfully flushed {sent} chunks");
    Ok(())
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Handle to a running [`BatchService`].
pub struct BatchSender {
    tx: mpsc::UnboundedSender<BatchCommand>,
    cancel_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    transport: Arc<dyn Transport>,
}

impl BatchSender {
    /// Spawns the flush loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRuntime`] when called outside a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: BatchConfig,
        error_sink: ErrorSink,
    ) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let service = BatchService {
            transport: Arc::clone(&transport),
            buffer: Vec::with_capacity(config.batch_size),
            config,
            rx,
            cancel_token: cancel_token.clone(),
            error_sink,
        };
        let task = runtime.spawn(service.run());

        Ok(BatchSender {
            tx,
            cancel_token,
            task: Mutex::new(Some(task)),
            transport,
        })
    }

    /// Flushes everything enqueued so far and waits for the flush to finish.
    pub async fn flush(&self) -> Result<(), SendError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(BatchCommand::Flush(ack_tx))
            .map_err(|_| SendError::Closed)?;
        ack_rx.await.map_err(|_| SendError::Closed)
    }
}

#[async_trait]
impl Sender for BatchSender {
    fn send(&self, payload: String) -> Result<(), SendError> {
        self.tx
            .send(BatchCommand::Push(payload))
            .map_err(|_| SendError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Held until the transport is closed so concurrent callers wait for
        // the drain.
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return Ok(());
        };

        self.cancel_token.cancel();
        if let Err(e) = handle.await {
            error!("TELEGRAM | Batch sender task failed: {e}");
        }

        self.transport.close().await
    }
}

// Dropping without `close` still drains the buffer, as long as the runtime
// keeps running.
impl Drop for BatchSender {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for BatchSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSender")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}
