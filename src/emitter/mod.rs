//! Output side of the decoder
//!
//! - [`LineComposer`] turns rendered fragments into timestamped lines
//! - [`LineSink`] receives the completed lines (stdout, a file, memory)

pub mod composer;
pub mod sink;

pub use composer::{ComposedLine, LineComposer, TimestampFormat};
pub use sink::{CollectingSink, LineSink, WriterSink};
