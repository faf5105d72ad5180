//! Build-time ID management
//!
//! Keeps the persisted ID tables consistent with the trice call sites of a
//! firmware source tree.
//!
//! # Components
//!
//! - [`FormatTable`] / [`LocationTable`] - the persisted `til.json` / `li.json`
//! - [`IdSpace`] - pool of unused IDs for one pass
//! - [`SourceWalker`] - deterministic traversal of source files
//! - [`MacroParser`] - call-site recognition and rewriting
//! - [`IdRegistry`] - the synchronization pass tying the above together

pub mod parser;
pub mod registry;
pub mod space;
pub mod table;
pub mod walker;

pub use parser::{apply_edits, CallSite, MacroParser, ParsedSource};
pub use registry::{
    update, zero_source_tree, zero_text, IdRegistry, SourceEncoding, SourceText, SyncOptions,
    SyncReport, ZeroReport,
};
pub use space::{IdPolicy, IdSpace, TableDrift};
pub use table::{FormatTable, Location, LocationTable, ReverseIndex};
pub use walker::{is_source_file, SourceEntry, SourceWalker};
