// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::error::TransportError;

/// Delivers one text message. Implementations own no buffering and do not
/// retry; senders call `send` sequentially.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `text` as a single message.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Releases the transport. Called once, after the last `send`.
    async fn close(&self) -> Result<(), TransportError>;
}
