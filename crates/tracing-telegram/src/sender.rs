// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Senders sit between the layer and a [`Transport`].
//!
//! [`new_sender`] validates the options and picks the implementation:
//! a [`DirectSender`] when batching is disabled (`batch_size == 0` and
//! `flush_interval == 0`), a [`BatchSender`] otherwise.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::batch_sender::{BatchConfig, BatchSender};
use crate::constants::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, MESSAGE_MAX_SIZE, MESSAGE_SEPARATOR};
use crate::error::{
    default_error_sink, ConfigError, DeliveryError, ErrorSink, FlushError, SendError,
    TransportError,
};
use crate::http::{get_client, ClientOptions};
use crate::telegram::TelegramTransport;
use crate::transport::Transport;

/// Accepts formatted payloads from the logging path.
///
/// `send` must not block on delivery; failures that happen later are reported
/// to the sender's error sink.
#[async_trait]
pub trait Sender: Send + Sync {
    fn send(&self, payload: String) -> Result<(), SendError>;

    /// Delivers everything accepted so far, then closes the transport.
    /// Calling it again returns `Ok(())`.
    async fn close(&self) -> Result<(), TransportError>;
}

#[derive(Clone)]
pub struct SenderOptions {
    /// Bot token issued by @BotFather. Required.
    pub token: String,
    /// Private, group, or channel chat to post to. Required.
    pub chat_id: i64,
    pub base_url: String,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
    /// Client used for Bot API calls. When set, `timeout` and `https_proxy`
    /// are ignored.
    pub http_client: Option<reqwest::Client>,
    /// Payload count that triggers a flush.
    pub batch_size: usize,
    /// Longest wait before buffered payloads are flushed.
    pub flush_interval: Duration,
    /// Log Bot API requests and responses at debug level.
    pub verbose: bool,
    pub max_chunk_size: usize,
    pub separator: String,
    pub error_sink: ErrorSink,
    /// Pre-built sender, used as-is when set.
    pub instance: Option<Arc<dyn Sender>>,
}

impl Default for SenderOptions {
    fn default() -> Self {
        SenderOptions {
            token: String::new(),
            chat_id: 0,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            https_proxy: None,
            http_client: None,
            batch_size: 0,
            flush_interval: Duration::ZERO,
            verbose: false,
            max_chunk_size: MESSAGE_MAX_SIZE,
            separator: MESSAGE_SEPARATOR.to_string(),
            error_sink: default_error_sink(),
            instance: None,
        }
    }
}

impl fmt::Debug for SenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderOptions")
            .field("chat_id", &self.chat_id)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("https_proxy", &self.https_proxy)
            .field("http_client", &self.http_client.is_some())
            .field("batch_size", &self.batch_size)
            .field("flush_interval", &self.flush_interval)
            .field("verbose", &self.verbose)
            .field("max_chunk_size", &self.max_chunk_size)
            .field("instance", &self.instance.is_some())
            .finish_non_exhaustive()
    }
}

impl SenderOptions {
    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.batch_size > 0 || !self.flush_interval.is_zero()
    }

    fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            flush_interval: self.flush_interval,
            max_chunk_size: self.max_chunk_size,
            separator: self.separator.clone(),
        }
    }
}

/// Builds the sender described by `options` over the Telegram Bot API.
///
/// # Errors
///
/// Returns an error if:
/// - `token` is empty or `chat_id` is zero (unless `instance` is set)
/// - the HTTP client cannot be built
/// - no tokio runtime is running on the calling thread
pub fn new_sender(options: SenderOptions) -> Result<Arc<dyn Sender>, ConfigError> {
    if let Some(instance) = options.instance {
        return Ok(instance);
    }

    if options.token.is_empty() {
        return Err(ConfigError::MissingToken);
    }

    if options.chat_id == 0 {
        return Err(ConfigError::MissingChatId);
    }

    Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

    let client = match &options.http_client {
        Some(client) => client.clone(),
        None => get_client(&ClientOptions {
            timeout: Some(options.timeout),
            https_proxy: options.https_proxy.clone(),
        })?,
    };
    let transport = TelegramTransport::new(
        client,
        &options.base_url,
        &options.token,
        options.chat_id,
    )
    .with_verbose(options.verbose);

    new_sender_with_transport(Arc::new(transport), &options)
}

/// Same choice as [`new_sender`], over any transport. Token and chat ID are
/// not checked.
///
/// # Errors
///
/// Returns [`ConfigError::NoRuntime`] when called outside a tokio runtime.
pub fn new_sender_with_transport(
    transport: Arc<dyn Transport>,
    options: &SenderOptions,
) -> Result<Arc<dyn Sender>, ConfigError> {
    let error_sink = Arc::clone(&options.error_sink);
    if options.is_batching() {
        let sender = BatchSender::new(transport, options.batch_config(), error_sink)?;
        Ok(Arc::new(sender))
    } else {
        Ok(Arc::new(DirectSender::new(transport, error_sink)?))
    }
}

/// Delivers every payload as its own message, in order, from a background
/// task.
pub struct DirectSender {
    tx: mpsc::UnboundedSender<String>,
    cancel_token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    transport: Arc<dyn Transport>,
}

impl DirectSender {
    /// Spawns the delivery loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoRuntime`] when called outside a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, error_sink: ErrorSink) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let task = runtime.spawn(deliver(
            Arc::clone(&transport),
            rx,
            cancel_token.clone(),
            error_sink,
        ));

        Ok(DirectSender {
            tx,
            cancel_token,
            task: Mutex::new(Some(task)),
            transport,
        })
    }
}

async fn deliver(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel_token: CancellationToken,
    error_sink: ErrorSink,
) {
    let send_one = |payload: String| {
        let transport = Arc::clone(&transport);
        let error_sink = Arc::clone(&error_sink);
        async move {
            if let Err(source) = transport.send(&payload).await {
                error_sink(&DeliveryError::Flush(FlushError {
                    sent: 0,
                    total: 1,
                    source,
                }));
            }
        }
    };

    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => break,
            Some(payload) = rx.recv() => send_one(payload).await,
        }
    }

    rx.close();
    let mut drained = 0;
    while let Ok(payload) = rx.try_recv() {
        send_one(payload).await;
        drained += 1;
    }
    debug!("TELEGRAM | Direct sender stopped after draining {drained} payloads");
}

#[async_trait]
impl Sender for DirectSender {
    fn send(&self, payload: String) -> Result<(), SendError> {
        self.tx.send(payload).map_err(|_| SendError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut task = self.task.lock().await;
        let Some(handle) = task.take() else {
            return Ok(());
        };

        self.cancel_token.cancel();
        if let Err(e) = handle.await {
            error!("TELEGRAM | Direct sender task failed: {e}");
        }

        self.transport.close().await
    }
}

impl Drop for DirectSender {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl fmt::Debug for DirectSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectSender")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}
