//! Run-time decoding
//!
//! Bytes from the device pass through three stages:
//!
//! 1. [`cipher`] - optional XTEA decryption per 8-byte block
//! 2. [`framer`] - frame boundaries, header parsing, byte order
//! 3. [`render`] - printf-style substitution of the parameters
//!
//! [`Decoder`] wires the stages together around a read-only [`FormatTable`].

pub mod check;
pub mod cipher;
pub mod framer;
pub mod printf;
pub mod render;
pub mod wire;

pub use check::{check_table, Dataset};
pub use cipher::{derive_key, key_hex, BlockDecryptor, Xtea, NO_ENCRYPTION};
pub use framer::{FramerConfig, FramerStats, StreamFramer, TraceRecord};
pub use render::{Arg, FormatRenderer, RenderOutcome};
pub use wire::{Endianness, FrameEncoder, FrameFormat, ParamLayout, ParamValue, Slot};

use crate::error::{Result, TriceError};
use crate::id::FormatTable;
use crate::types::TriceId;
use std::collections::HashSet;

/// A record together with its rendered text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub record: TraceRecord,
    pub text: String,
    pub mismatch: Option<String>,
}

/// Framer plus renderer bound to one format table
#[derive(Debug)]
pub struct Decoder {
    table: FormatTable,
    framer: StreamFramer,
    renderer: FormatRenderer,
    reported: HashSet<TriceId>,
}

impl Decoder {
    /// Create a decoder over `table`
    pub fn new(table: FormatTable, config: FramerConfig) -> Self {
        let framer = StreamFramer::new(&table, config);
        Self {
            table,
            framer,
            renderer: FormatRenderer::new(),
            reported: HashSet::new(),
        }
    }

    /// The format table in use
    pub fn table(&self) -> &FormatTable {
        &self.table
    }

    /// Framer counters
    pub fn stats(&self) -> FramerStats {
        self.framer.stats()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.framer.push(bytes);
    }

    /// Decode and render the next record, `None` when more bytes are needed
    pub fn next_decoded(&mut self) -> Option<Result<Decoded>> {
        let record = match self.framer.next_record()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };

        let (Some(fmt), Some(layout)) = (self.table.get(record.id), self.framer.layout(record.id))
        else {
            return Some(Err(TriceError::Framing(format!("unknown ID {}", record.id))));
        };
        let outcome = self.renderer.render(fmt, layout, &record.params);

        if let Some(mismatch) = &outcome.mismatch {
            if self.reported.insert(record.id) {
                tracing::warn!("ID {}: {}", record.id, mismatch);
            }
        }

        Some(Ok(Decoded {
            record,
            text: outcome.text,
            mismatch: outcome.mismatch,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StampWidth, TriceFmt};

    #[test]
    fn test_decoder_renders_records() {
        let fmt = TriceFmt::new("TRICE8", "msg:value=%u\\n");
        let table: FormatTable = [(TriceId(3937), fmt.clone())].into_iter().collect();
        let layout = ParamLayout::from_fmt(&fmt).unwrap();
        let params = wire::pack_params(&layout, &[ParamValue::Int(200)]);
        let frame = FrameEncoder::new(FrameFormat::TypeDerived, Endianness::Little).encode(
            TriceId(3937),
            StampWidth::None,
            0,
            &layout,
            &params,
        );

        let mut decoder = Decoder::new(table, FramerConfig::default());
        decoder.push(&frame);
        decoder.push(&frame);
        for _ in 0..2 {
            let decoded = decoder.next_decoded().unwrap().unwrap();
            assert_eq!(decoded.text, "msg:value=200\\n");
            assert!(decoded.mismatch.is_none());
        }
        assert!(decoder.next_decoded().is_none());
        assert_eq!(decoder.stats().records, 2);
    }
}
