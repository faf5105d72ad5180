//! Line sinks
//!
//! A [`LineSink`] receives completed lines in arrival order. Writing may
//! block (a slow terminal, a remote connection); the decode pipeline blocks
//! with it instead of dropping lines.

use crate::emitter::composer::ComposedLine;
use crate::error::{Result, ResultExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Destination of composed lines
#[cfg_attr(test, mockall::automock)]
pub trait LineSink: Send {
    /// Write one completed line
    fn write_line(&mut self, line: &ComposedLine) -> Result<()>;

    /// Push buffered output to its destination
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl LineSink for Box<dyn LineSink> {
    fn write_line(&mut self, line: &ComposedLine) -> Result<()> {
        (**self).write_line(line)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

// ==================== Writer Sink ====================

/// Writes each line followed by `\n` to any [`Write`]
pub struct WriterSink<W: Write + Send> {
    writer: W,
    lines: u64,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    /// Lines written so far
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<std::io::Stdout> {
    /// Sink writing to standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl WriterSink<BufWriter<File>> {
    /// Sink writing to a file, truncating it
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        tracing::info!("Writing decoded lines to {:?}", path);
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> LineSink for WriterSink<W> {
    fn write_line(&mut self, line: &ComposedLine) -> Result<()> {
        writeln!(self.writer, "{}", line).context("writing decoded line")?;
        self.lines += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("flushing decoded lines")
    }
}

// ==================== Collecting Sink ====================

/// Keeps lines in memory; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    lines: Arc<Mutex<Vec<ComposedLine>>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the collected lines
    pub fn lines(&self) -> Vec<ComposedLine> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Bodies of the collected lines
    pub fn bodies(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| l.body).collect()
    }
}

impl LineSink for CollectingSink {
    fn write_line(&mut self, line: &ComposedLine) -> Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(body: &str) -> ComposedLine {
        ComposedLine {
            timestamp: String::new(),
            prefix: String::new(),
            body: body.to_string(),
            suffix: String::new(),
        }
    }

    #[test]
    fn test_writer_sink() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_line(&line("a")).unwrap();
        sink.write_line(&line("b")).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.lines(), 2);
        assert_eq!(sink.into_inner(), b"a\nb\n");
    }

    #[test]
    fn test_file_sink() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = WriterSink::create(&path).unwrap();
        sink.write_line(&line("hello")).unwrap();
        sink.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn test_collecting_sink_shares_storage() {
        let sink = CollectingSink::new();
        let mut writer = sink.clone();
        writer.write_line(&line("x")).unwrap();
        assert_eq!(sink.bodies(), vec!["x".to_string()]);
    }
}
