// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Telegram Bot API transport.
//!
//! Every payload becomes one `sendMessage` call:
//!
//! ```text
//! POST {base_url}/bot{token}/sendMessage
//! {"chat_id": -100123, "text": "...", "parse_mode": "HTML"}
//! ```
//!
//! The Bot API answers `{"ok": true, "result": {...}}` on success and
//! `{"ok": false, "error_code": 400, "description": "..."}` otherwise.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::constants::PARSE_MODE;
use crate::error::TransportError;
use crate::transport::Transport;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<u16>,
}

#[derive(Clone)]
pub struct TelegramTransport {
    client: reqwest::Client,
    url: String,
    chat_id: i64,
    verbose: bool,
}

impl TelegramTransport {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str, token: &str, chat_id: i64) -> Self {
        TelegramTransport {
            client,
            url: format!("{}/bot{}/sendMessage", base_url.trim_end_matches('/'), token),
            chat_id,
            verbose: false,
        }
    }

    /// Logs every request and response at debug level.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

// The URL embeds the bot token.
impl fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("chat_id", &self.chat_id)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        let body = SendMessage {
            chat_id: self.chat_id,
            text,
            parse_mode: PARSE_MODE,
        };

        if self.verbose {
            debug!(
                "TELEGRAM | sendMessage request: chat_id={} bytes={}",
                self.chat_id,
                text.len()
            );
        }

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(reqwest::Error::without_url)?;

        if self.verbose {
            debug!(
                "TELEGRAM | sendMessage response: {} {}",
                status,
                String::from_utf8_lossy(&bytes)
            );
        }

        let parsed: Option<ApiResponse> = serde_json::from_slice(&bytes).ok();
        match parsed {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(api) => Err(TransportError::Api {
                status: api.error_code.unwrap_or(status.as_u16()),
                description: api
                    .description
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string()),
            }),
            None if status.is_success() => Err(TransportError::Decode(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            None => Err(TransportError::Api {
                status: status.as_u16(),
                description: String::from_utf8_lossy(&bytes).into_owned(),
            }),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
