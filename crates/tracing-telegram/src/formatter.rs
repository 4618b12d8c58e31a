// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Renders log records as Telegram HTML messages.
//!
//! The default output looks like:
//!
//! ```text
//! <i>ℹ️ Info</i>
//! <i>⌚️ 2024-12-29T15:00:00Z</i>
//!
//! <b>💬 Test message</b>
//! <tg-spoiler><blockquote expandable>🔘 key1: value1
//! 🔘 key2: 42
//! </blockquote></tg-spoiler>
//! ```
//!
//! The layout comes from a template with the placeholders `{level}`, `{time}`,
//! `{message}` and `{attrs}`. Text between `{#attrs}` and `{/attrs}` is only
//! rendered when the record has attributes. `{{` and `}}` are literal braces.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::Level;

use crate::error::{ConfigError, FormatError};

pub const DEFAULT_TEMPLATE: &str = "{level}\n{time}\n\n{message}{#attrs}\n<tg-spoiler><blockquote expandable>{attrs}</blockquote></tg-spoiler>{/attrs}\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub key: String,
    pub value: String,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Attr {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

/// One log event, already detached from `tracing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub level: Level,
    pub time: DateTime<Utc>,
    pub message: String,
    pub attrs: Vec<Attr>,
}

impl Record {
    #[must_use]
    pub fn new(level: Level, time: DateTime<Utc>, message: impl Into<String>) -> Self {
        Record {
            level,
            time,
            message: message.into(),
            attrs: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.push(Attr::new(key, value));
        self
    }
}

pub trait Formatter: Send + Sync {
    fn format(&self, record: &Record) -> Result<String, FormatError>;
}

/// Renders one part of a record.
pub type PartFormatter = Arc<dyn Fn(&Record) -> String + Send + Sync>;

#[derive(Clone, Default)]
pub struct FormatterOptions {
    pub template: Option<String>,
    pub level: Option<PartFormatter>,
    pub time: Option<PartFormatter>,
    pub message: Option<PartFormatter>,
    pub attrs: Option<PartFormatter>,
    /// Pre-built formatter, used as-is when set.
    pub instance: Option<Arc<dyn Formatter>>,
}

impl fmt::Debug for FormatterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterOptions")
            .field("template", &self.template)
            .field("level", &self.level.is_some())
            .field("time", &self.time.is_some())
            .field("message", &self.message.is_some())
            .field("attrs", &self.attrs.is_some())
            .field("instance", &self.instance.is_some())
            .finish()
    }
}

/// Builds the formatter described by `options`, or returns `instance` as-is.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTemplate`] if the template has an unknown
/// placeholder, unbalanced braces, or an unclosed `{#attrs}` section.
pub fn new_formatter(options: FormatterOptions) -> Result<Arc<dyn Formatter>, ConfigError> {
    if let Some(instance) = options.instance {
        return Ok(instance);
    }

    let template = Template::parse(options.template.as_deref().unwrap_or(DEFAULT_TEMPLATE))?;

    Ok(Arc::new(TemplateFormatter {
        template,
        level: options.level.unwrap_or_else(|| Arc::new(format_level)),
        time: options.time.unwrap_or_else(|| Arc::new(format_time)),
        message: options.message.unwrap_or_else(|| Arc::new(format_message)),
        attrs: options.attrs.unwrap_or_else(|| Arc::new(format_attrs)),
    }))
}

struct TemplateFormatter {
    template: Template,
    level: PartFormatter,
    time: PartFormatter,
    message: PartFormatter,
    attrs: PartFormatter,
}

impl Formatter for TemplateFormatter {
    fn format(&self, record: &Record) -> Result<String, FormatError> {
        let mut out = String::new();
        self.render(&self.template.segments, record, &mut out);
        Ok(out)
    }
}

impl TemplateFormatter {
    fn render(&self, segments: &[Segment], record: &Record, out: &mut String) {
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Field(Field::Level) => out.push_str(&(self.level)(record)),
                Segment::Field(Field::Time) => out.push_str(&(self.time)(record)),
                Segment::Field(Field::Message) => out.push_str(&(self.message)(record)),
                Segment::Field(Field::Attrs) => out.push_str(&(self.attrs)(record)),
                Segment::IfAttrs(inner) => {
                    if !record.attrs.is_empty() {
                        self.render(inner, record, out);
                    }
                }
            }
        }
    }
}

#[must_use]
pub fn format_level(record: &Record) -> String {
    let label = match record.level {
        Level::TRACE => "🔬 Trace",
        Level::DEBUG => "🐞 Debug",
        Level::INFO => "ℹ️ Info",
        Level::WARN => "⚠️ Warning",
        _ => "⛔ Error",
    };
    format!("<i>{label}</i>")
}

#[must_use]
pub fn format_time(record: &Record) -> String {
    format!(
        "<i>⌚️ {}</i>",
        record.time.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

#[must_use]
pub fn format_message(record: &Record) -> String {
    format!("<b>💬 {}</b>", escape_html(&record.message))
}

#[must_use]
pub fn format_attrs(record: &Record) -> String {
    record
        .attrs
        .iter()
        .map(|attr| {
            format!(
                "🔘 {}: {}\n",
                escape_html(&attr.key),
                escape_html(&attr.value)
            )
        })
        .collect()
}

/// Escapes the characters the Bot API HTML parser treats as markup.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Level,
    Time,
    Message,
    Attrs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Field(Field),
    IfAttrs(Vec<Segment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Template {
    segments: Vec<Segment>,
}

impl Template {
    fn parse(source: &str) -> Result<Self, ConfigError> {
        // Sections do not nest, so one level of stack is enough.
        let mut top: Vec<Segment> = Vec::new();
        let mut section: Option<Vec<Segment>> = None;
        let mut text = String::new();
        let mut rest = source;

        while let Some(pos) = rest.find(['{', '}']) {
            text.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if tail.starts_with("{{") || tail.starts_with("}}") {
                text.push_str(&tail[..1]);
                rest = &tail[2..];
                continue;
            }

            if tail.starts_with('}') {
                return Err(invalid(format!("unmatched '}}' at byte {}", source.len() - tail.len())));
            }

            let end = tail
                .find('}')
                .ok_or_else(|| invalid(format!("unclosed '{{' at byte {}", source.len() - tail.len())))?;
            let tag = &tail[1..end];
            rest = &tail[end + 1..];

            let target = section.as_mut().unwrap_or(&mut top);
            if !text.is_empty() {
                target.push(Segment::Text(std::mem::take(&mut text)));
            }

            match tag {
                "level" => target.push(Segment::Field(Field::Level)),
                "time" => target.push(Segment::Field(Field::Time)),
                "message" => target.push(Segment::Field(Field::Message)),
                "attrs" => target.push(Segment::Field(Field::Attrs)),
                "#attrs" => {
                    if section.is_some() {
                        return Err(invalid("sections cannot be nested".to_string()));
                    }
                    section = Some(Vec::new());
                }
                "/attrs" => match section.take() {
                    Some(inner) => top.push(Segment::IfAttrs(inner)),
                    None => return Err(invalid("'{/attrs}' without '{#attrs}'".to_string())),
                },
                other => return Err(invalid(format!("unknown placeholder '{{{other}}}'"))),
            }
        }

        text.push_str(rest);
        if section.is_some() {
            return Err(invalid("'{#attrs}' is never closed".to_string()));
        }
        if !text.is_empty() {
            top.push(Segment::Text(text));
        }

        Ok(Template { segments: top })
    }
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::InvalidTemplate(reason)
}
