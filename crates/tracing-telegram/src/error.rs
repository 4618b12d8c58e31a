// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::error;

/// Errors raised while building a layer, formatter, or sender
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("token is required")]
    MissingToken,

    #[error("chat ID is required")]
    MissingChatId,

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("senders must be created from within a tokio runtime")]
    NoRuntime,
}

/// A formatter could not render a record. The record is dropped.
#[derive(Debug, thiserror::Error)]
#[error("failed to format record: {0}")]
pub struct FormatError(pub String);

/// A single Bot API call failed
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: {description}")]
    Api { status: u16, description: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// A flush stopped at the first rejected chunk. Chunks after it were abandoned.
#[derive(Debug, thiserror::Error)]
#[error("flush aborted after {sent} of {total} chunks: {source}")]
pub struct FlushError {
    pub sent: usize,
    pub total: usize,
    #[source]
    pub source: TransportError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("sender is closed")]
    Closed,
}

/// Returned by [`crate::layer::TelegramLayer::handle`]
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("telegram: {0}")]
    Format(#[from] FormatError),

    #[error("telegram: {0}")]
    Send(#[from] SendError),
}

/// Failures that happen away from any caller and can only be observed
/// through an [`ErrorSink`].
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Flush(#[from] FlushError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl From<HandleError> for DeliveryError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::Format(e) => DeliveryError::Format(e),
            HandleError::Send(e) => DeliveryError::Send(e),
        }
    }
}

pub type ErrorSink = Arc<dyn Fn(&DeliveryError) + Send + Sync>;

/// Logs every delivery failure at error level.
///
/// Events from this crate are never forwarded by the layer, so the log line
/// reaches the other layers of the subscriber only.
#[must_use]
pub fn default_error_sink() -> ErrorSink {
    Arc::new(|err: &DeliveryError| {
        error!("TELEGRAM | {err}");
    })
}
