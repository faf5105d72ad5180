//! Line composer
//!
//! Rendered trices do not map one-to-one onto output lines: one trice may
//! carry several lines, several trices may build up one line. The
//! [`LineComposer`] accepts text fragments, splits them at line breaks and
//! hands completed [`ComposedLine`]s to a [`LineSink`].
//!
//! # Timestamps
//!
//! A line is stamped when its first fragment arrives. Fragments that extend
//! the line later keep that stamp. A line that was opened by an empty
//! fragment is dropped again at the end of the call, so an idle link does
//! not leave a stale stamp behind for the next real content.

use crate::emitter::sink::LineSink;
use crate::error::Result;
use chrono::{DateTime, Local, Utc};
use std::fmt;

/// Format of the host timestamp placed at the start of each line
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimestampFormat {
    /// Local time with microseconds
    #[default]
    LocalMicro,
    /// UTC with microseconds
    UtcMicro,
    /// No timestamp
    Off,
    /// Constant dummy timestamp, for reproducible output
    Zero,
    /// Any other text, printed verbatim
    Literal(String),
}

impl TimestampFormat {
    const STAMP_MICRO: &'static str = "%b %e %H:%M:%S%.6f";

    /// Parse a configuration value; unknown values become literals
    pub fn parse(value: &str) -> Self {
        match value {
            "LOCmicro" => TimestampFormat::LocalMicro,
            "UTCmicro" => TimestampFormat::UtcMicro,
            "off" | "none" | "" => TimestampFormat::Off,
            "zero" => TimestampFormat::Zero,
            other => TimestampFormat::Literal(other.to_string()),
        }
    }

    /// Render the timestamp column for the instant `now`
    pub fn render(&self, now: DateTime<Utc>) -> String {
        match self {
            TimestampFormat::LocalMicro => {
                format!("{}  ", now.with_timezone(&Local).format(Self::STAMP_MICRO))
            }
            TimestampFormat::UtcMicro => format!("UTC {}  ", now.format(Self::STAMP_MICRO)),
            TimestampFormat::Off => String::new(),
            TimestampFormat::Zero => "2006-01-02_1504-05 ".to_string(),
            TimestampFormat::Literal(text) => format!("{} ", text),
        }
    }
}

/// One completed output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedLine {
    pub timestamp: String,
    pub prefix: String,
    pub body: String,
    pub suffix: String,
}

impl fmt::Display for ComposedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}{}", self.timestamp, self.prefix, self.body, self.suffix)
    }
}

struct PendingLine {
    timestamp: String,
    body: String,
}

type Clock = Box<dyn FnMut() -> DateTime<Utc> + Send>;

/// Assembles fragments into lines
pub struct LineComposer<S: LineSink> {
    sink: S,
    format: TimestampFormat,
    prefix: String,
    suffix: String,
    pending: Option<PendingLine>,
    clock: Clock,
    lines: u64,
}

impl<S: LineSink> LineComposer<S> {
    /// Create a composer writing to `sink`
    pub fn new(sink: S, format: TimestampFormat, prefix: &str, suffix: &str) -> Self {
        Self {
            sink,
            format,
            prefix: if prefix.is_empty() {
                String::new()
            } else {
                format!("{} ", prefix)
            },
            suffix: if suffix.is_empty() {
                String::new()
            } else {
                format!(" {}", suffix)
            },
            pending: None,
            clock: Box::new(Utc::now),
            lines: 0,
        }
    }

    /// Replace the wall clock, used by tests
    pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Utc> + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Whether the next fragment starts a new line
    pub fn is_line_start(&self) -> bool {
        self.pending.is_none()
    }

    /// Lines emitted so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Access the sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consume the composer, returning the sink. A pending line is lost;
    /// call [`flush`](Self::flush) first to keep it.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Accept one rendered fragment
    pub fn write(&mut self, fragment: &str) -> Result<()> {
        if fragment.is_empty() {
            return Ok(());
        }
        let normalized = fragment
            .replace("\\r\\n", "\n")
            .replace("\\n", "\n")
            .replace("\r\n", "\n");
        let parts: Vec<&str> = normalized.split('\n').collect();
        let mut line_ends = parts.len() - 1;
        let mut stamp: Option<String> = None;
        let mut opened_empty = false;

        for part in parts {
            match self.pending.take() {
                None if line_ends > 0 => {
                    let timestamp = self.stamp(&mut stamp);
                    self.emit(timestamp, part.to_string())?;
                    line_ends -= 1;
                }
                None => {
                    opened_empty = part.is_empty();
                    self.pending = Some(PendingLine {
                        timestamp: self.stamp(&mut stamp),
                        body: part.to_string(),
                    });
                }
                Some(mut line) if line_ends > 0 => {
                    line.body.push_str(part);
                    self.emit(line.timestamp, line.body)?;
                    line_ends -= 1;
                }
                Some(mut line) => {
                    line.body.push_str(part);
                    self.pending = Some(line);
                }
            }
        }

        if opened_empty {
            self.pending = None;
        }
        Ok(())
    }

    /// Force out the pending line, if any, and flush the sink
    pub fn flush(&mut self) -> Result<()> {
        if let Some(line) = self.pending.take() {
            self.emit(line.timestamp, line.body)?;
        }
        self.sink.flush()
    }

    fn stamp(&mut self, cached: &mut Option<String>) -> String {
        if let Some(s) = cached {
            return s.clone();
        }
        let s = self.format.render((self.clock)());
        *cached = Some(s.clone());
        s
    }

    fn emit(&mut self, timestamp: String, body: String) -> Result<()> {
        let line = ComposedLine {
            timestamp,
            prefix: self.prefix.clone(),
            body,
            suffix: self.suffix.clone(),
        };
        self.lines += 1;
        self.sink.write_line(&line)
    }
}
