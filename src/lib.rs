//! # trice-rs: ID registry and trace decoder for trice logs
//!
//! Firmware logs through `TRICE(...)` macros that carry a numeric ID instead
//! of the format string. The strings live on the host in a format table, so
//! the device only sends the ID, an optional timestamp and the raw
//! parameters.
//!
//! ## Architecture
//!
//! - **Build time** ([`id`]): scan the source tree, hand out IDs to new call
//!   sites, rewrite them in place and keep `til.json` / `li.json` current
//! - **Run time** ([`decoder`], [`emitter`], [`pipeline`]): frame the byte
//!   stream from the device, render each record with its format string and
//!   assemble the fragments into timestamped lines
//! - **Communication**: a receiver thread and the decode worker talk over a
//!   bounded crossbeam channel
//!
//! ## Configuration
//!
//! Settings come from `trice.toml`, see [`config`] for where it is looked up.
//!
//! ## Example
//!
//! ```ignore
//! use trice_rs::{
//!     config::TriceConfig,
//!     decoder::Decoder,
//!     emitter::{LineComposer, WriterSink},
//!     id::FormatTable,
//!     pipeline::DecodePipeline,
//! };
//!
//! fn main() -> trice_rs::Result<()> {
//!     let config = TriceConfig::load_or_default(None)?;
//!     let table = FormatTable::load(&config.id.til)?;
//!     let decoder = Decoder::new(table, config.framer_config());
//!     let composer = LineComposer::new(
//!         WriterSink::stdout(),
//!         config.timestamp_format(),
//!         &config.log.prefix,
//!         &config.log.suffix,
//!     );
//!
//!     let pipeline = DecodePipeline::new(config.pipeline_options());
//!     let stats = pipeline.run(std::io::stdin(), decoder, composer)?;
//!     println!("{} records", stats.records);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decoder;
pub mod emitter;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::TriceConfig;
pub use decoder::{Decoded, Decoder, FramerConfig, TraceRecord};
pub use emitter::{ComposedLine, LineComposer, LineSink, TimestampFormat};
pub use error::{Result, ResultExt, TriceError};
pub use id::{FormatTable, IdRegistry, LocationTable, SyncOptions, SyncReport};
pub use pipeline::{DecodePipeline, PipelineOptions, PipelineStats, StopHandle};
pub use types::{IdRange, MacroType, StampWidth, TriceFmt, TriceId};
