// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and defaults of the Telegram Bot API delivery path.

use std::time::Duration;

/// Maximum size in bytes of a single chat message built by the chunk packer.
///
/// The Bot API rejects `sendMessage` texts above 4096 characters. Payloads are
/// measured in bytes, so multi-byte text stays under the limit.
pub const MESSAGE_MAX_SIZE: usize = 4096;

/// Appended after every payload inside a chunk.
pub const MESSAGE_SEPARATOR: &str = "\n---\n";

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";

/// Request timeout applied to every Bot API call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parse mode sent with every message; the default formatter emits HTML.
pub(crate) const PARSE_MODE: &str = "HTML";

/// Targets whose events the layer never forwards. Delivery diagnostics and
/// the HTTP stack would otherwise feed back into delivery.
pub(crate) const IGNORED_TARGETS: [&str; 6] = [
    "tracing_telegram",
    "hyper",
    "hyper_util",
    "h2",
    "reqwest",
    "rustls",
];
