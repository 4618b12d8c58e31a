// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivers `tracing` events to a Telegram chat.
//!
//! ```text
//!   tracing event
//!        │
//!        v
//!   ┌──────────────┐
//!   │ TelegramLayer│  (level filter, attrs, groups)
//!   └──────┬───────┘
//!          v
//!   ┌──────────────┐
//!   │  Formatter   │  (record -> HTML text)
//!   └──────┬───────┘
//!          v
//!   ┌──────────────┐
//!   │    Sender    │  (direct, or batching actor + chunk packer)
//!   └──────┬───────┘
//!          v
//!   ┌──────────────┐
//!   │  Transport   │  (Bot API sendMessage)
//!   └──────────────┘
//! ```
//!
//! Delivery failures never reach the logging call site. They are reported
//! to an [`error::ErrorSink`]; only [`layer::TelegramLayer::close`] returns
//! the transport's terminal error.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch_sender;
pub mod chunker;
pub mod config;
pub mod constants;
pub mod error;
pub mod formatter;
pub mod http;
pub mod layer;
pub mod sender;
pub mod telegram;
pub mod transport;

pub use layer::{HandlerOptions, TelegramLayer};
