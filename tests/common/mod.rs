//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod streams;

use trice_rs::{FormatTable, TriceFmt, TriceId};

/// Format table from `(id, macro type, format string)` triples
pub fn table(entries: &[(u32, &str, &str)]) -> FormatTable {
    entries
        .iter()
        .map(|(id, ty, fmt)| (TriceId(*id), TriceFmt::new(*ty, *fmt)))
        .collect()
}
