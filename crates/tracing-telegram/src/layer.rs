// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `tracing` layer that forwards events to a Telegram chat.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracing_subscriber::prelude::*;
//! use tracing_telegram::TelegramLayer;
//!
//! let telegram = TelegramLayer::with_token(token, chat_id)?;
//! tracing_subscriber::registry()
//!     .with(telegram.clone())
//!     .init();
//!
//! tracing::warn!(user = "alice", "disk almost full");
//!
//! telegram.close().await?;
//! ```
//!
//! # Record Contents
//!
//! Each event becomes a [`Record`] whose attributes are, in order: the event
//! fields, the fields of every span in scope (root first), and the layer's
//! static attributes. Group names from [`TelegramLayer::with_group`] followed
//! by the names of the spans in scope are joined into one `groups` attribute.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::Level;
use tracing_core::{span, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::constants::IGNORED_TARGETS;
use crate::error::{ConfigError, ErrorSink, HandleError, TransportError};
use crate::formatter::{new_formatter, Attr, Formatter, FormatterOptions, Record};
use crate::sender::{new_sender, Sender, SenderOptions};

const MESSAGE_FIELD: &str = "message";
const GROUPS_ATTR: &str = "groups";

#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Least severe level that is forwarded. Defaults to `INFO`.
    pub level: Level,
    pub formatter: FormatterOptions,
    pub sender: SenderOptions,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        HandlerOptions {
            level: Level::INFO,
            formatter: FormatterOptions::default(),
            sender: SenderOptions::default(),
        }
    }
}

#[derive(Clone)]
pub struct TelegramLayer {
    formatter: Arc<dyn Formatter>,
    sender: Arc<dyn Sender>,
    min_level: Level,
    attrs: Vec<Attr>,
    groups: Vec<String>,
    error_sink: ErrorSink,
}

impl TelegramLayer {
    /// Builds the formatter and sender described by `options`. The sender's
    /// delivery task is spawned on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not parse, the token or chat ID
    /// is missing, or no tokio runtime is running on the calling thread.
    pub fn new(options: HandlerOptions) -> Result<Self, ConfigError> {
        let error_sink = Arc::clone(&options.sender.error_sink);
        let formatter = new_formatter(options.formatter)?;
        let sender = new_sender(options.sender)?;

        Ok(Self::from_parts(formatter, sender, options.level, error_sink))
    }

    /// Default formatting, no batching, `INFO` and above.
    pub fn with_token(token: impl Into<String>, chat_id: i64) -> Result<Self, ConfigError> {
        Self::new(HandlerOptions {
            sender: SenderOptions {
                token: token.into(),
                chat_id,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[must_use]
    pub fn from_parts(
        formatter: Arc<dyn Formatter>,
        sender: Arc<dyn Sender>,
        min_level: Level,
        error_sink: ErrorSink,
    ) -> Self {
        TelegramLayer {
            formatter,
            sender,
            min_level,
            attrs: Vec::new(),
            groups: Vec::new(),
            error_sink,
        }
    }

    #[must_use]
    pub fn enabled(&self, level: &Level) -> bool {
        *level <= self.min_level
    }

    /// Returns a layer that appends `attrs` to every record.
    #[must_use]
    pub fn with_attrs(&self, attrs: impl IntoIterator<Item = Attr>) -> Self {
        let mut layer = self.clone();
        layer.attrs.extend(attrs);
        layer
    }

    #[must_use]
    pub fn with_group(&self, name: &str) -> Self {
        let mut layer = self.clone();
        if !name.is_empty() {
            layer.groups.push(name.to_string());
        }
        layer
    }

    #[must_use]
    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }

    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Formats `record` with the layer's attributes and groups and hands it
    /// to the sender. A record that fails to format is dropped.
    pub fn handle(&self, record: Record) -> Result<(), HandleError> {
        self.handle_in_scope(record, &[])
    }

    fn handle_in_scope(&self, mut record: Record, spans: &[String]) -> Result<(), HandleError> {
        record.attrs.extend(self.attrs.iter().cloned());

        let groups: Vec<&str> = self
            .groups
            .iter()
            .chain(spans)
            .map(String::as_str)
            .collect();
        if !groups.is_empty() {
            record.attrs.push(Attr::new(GROUPS_ATTR, groups.join(", ")));
        }

        let text = self.formatter.format(&record)?;
        self.sender.send(text)?;

        Ok(())
    }

    /// Flushes pending records and closes the transport.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.sender.close().await
    }
}

impl fmt::Debug for TelegramLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramLayer")
            .field("min_level", &self.min_level)
            .field("attrs", &self.attrs)
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

/// Matches a crate and its modules: `hyper` and `hyper::client`, not `hyperion`.
fn is_ignored(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|ignored| {
        target
            .strip_prefix(ignored)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Span fields, stored in the span's extensions when the span is created.
#[derive(Debug, Default)]
struct SpanFields(Vec<Attr>);

#[derive(Debug, Default)]
struct FieldVisitor {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: String) {
        let name = field.name();
        if name == MESSAGE_FIELD {
            self.message = Some(value);
        } else if !name.starts_with("log.") {
            self.attrs.push(Attr {
                key: name.to_string(),
                value,
            });
        }
    }

    fn into_attrs(self) -> Vec<Attr> {
        let mut attrs = self.attrs;
        if let Some(message) = self.message {
            attrs.insert(0, Attr::new(MESSAGE_FIELD, message));
        }
        attrs
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

impl<S> Layer<S> for TelegramLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut()
            .insert(SpanFields(visitor.into_attrs()));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            fields.0.extend(visitor.into_attrs());
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.enabled(metadata.level()) || is_ignored(metadata.target()) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = Record {
            level: *metadata.level(),
            time: Utc::now(),
            message: visitor.message.unwrap_or_default(),
            attrs: visitor.attrs,
        };

        let mut spans = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                spans.push(span.name().to_string());
                let extensions = span.extensions();
                if let Some(fields) = extensions.get::<SpanFields>() {
                    record.attrs.extend(fields.0.iter().cloned());
                }
            }
        }

        if let Err(e) = self.handle_in_scope(record, &spans) {
            (self.error_sink)(&e.into());
        }
    }
}
