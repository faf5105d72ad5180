//! Stream framer
//!
//! Turns an unbounded byte stream into [`TraceRecord`]s. The framer is a
//! three-state machine:
//!
//! - `Syncing` - discard bytes up to the next sync byte and parse a header
//! - `InFrame` - wait until the payload described by the ID's layout is complete
//! - `Emit` - hand out the record (or a framing error) and return to `Syncing`
//!
//! On any framing error the framer drops the sync byte it started from and
//! searches again, so one corrupt frame costs at most the bytes up to the
//! next valid header.

use crate::decoder::cipher::{BlockDecryptor, Xtea};
use crate::decoder::wire::{
    parse_header, Endianness, FrameFormat, FrameHeader, HeaderParse, Measure, ParamLayout, SYNC,
};
use crate::error::{Result, TriceError};
use crate::id::FormatTable;
use crate::types::{StampWidth, TriceId};
use std::collections::HashMap;

/// One decoded trice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Format key
    pub id: TriceId,
    /// Width of the device timestamp
    pub stamp: StampWidth,
    /// Device timestamp, 0 without stamp
    pub timestamp: u32,
    /// Parameter bytes in host byte order
    pub params: Vec<u8>,
}

/// Counters kept by the framer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Bytes accepted (after decryption)
    pub bytes: u64,
    /// Records emitted
    pub records: u64,
    /// Framing errors reported
    pub framing_errors: u64,
    /// Bytes skipped while searching for a sync byte
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy)]
enum FramerState {
    Syncing,
    InFrame(FrameHeader),
}

/// Framer configuration
#[derive(Debug, Clone, Default)]
pub struct FramerConfig {
    pub format: FrameFormat,
    pub endianness: Endianness,
    pub cipher: Option<Xtea>,
}

/// Byte stream to record converter
#[derive(Debug)]
pub struct StreamFramer {
    format: FrameFormat,
    endianness: Endianness,
    layouts: HashMap<TriceId, ParamLayout>,
    decryptor: Option<BlockDecryptor>,
    buf: Vec<u8>,
    state: FramerState,
    stats: FramerStats,
}

impl StreamFramer {
    /// Create a framer resolving IDs against `table`. Entries whose macro
    /// type cannot be decoded are skipped and later reported as unknown IDs.
    pub fn new(table: &FormatTable, config: FramerConfig) -> Self {
        let mut layouts = HashMap::with_capacity(table.len());
        for (id, fmt) in table.iter() {
            match ParamLayout::from_fmt(fmt) {
                Ok(layout) => {
                    layouts.insert(id, layout);
                }
                Err(e) => tracing::warn!("ID {} cannot be decoded: {}", id, e),
            }
        }
        Self {
            format: config.format,
            endianness: config.endianness,
            layouts,
            decryptor: config.cipher.map(BlockDecryptor::new),
            buf: Vec::with_capacity(1024),
            state: FramerState::Syncing,
            stats: FramerStats::default(),
        }
    }

    /// Parameter layout registered for `id`
    pub fn layout(&self, id: TriceId) -> Option<&ParamLayout> {
        self.layouts.get(&id)
    }

    /// Counters so far
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append received bytes
    pub fn push(&mut self, bytes: &[u8]) {
        let before = self.buf.len();
        match &mut self.decryptor {
            Some(decryptor) => decryptor.push(bytes, &mut self.buf),
            None => self.buf.extend_from_slice(bytes),
        }
        self.stats.bytes += (self.buf.len() - before) as u64;
    }

    /// Decode the next record. `None` means more bytes are needed.
    pub fn next_record(&mut self) -> Option<Result<TraceRecord>> {
        loop {
            match self.state {
                FramerState::Syncing => {
                    let start = self.buf.iter().position(|b| *b == SYNC);
                    let skip = start.unwrap_or(self.buf.len());
                    if skip > 0 {
                        tracing::trace!("Skipping {} bytes before sync", skip);
                        self.stats.skipped += skip as u64;
                        self.buf.drain(..skip);
                    }
                    if self.buf.is_empty() {
                        return None;
                    }

                    let header = match parse_header(&self.buf, self.format, self.endianness) {
                        HeaderParse::Incomplete => return None,
                        HeaderParse::Invalid(message) => return Some(Err(self.resync(message))),
                        HeaderParse::Complete(header) => header,
                    };
                    if !self.layouts.contains_key(&header.id) {
                        let message = format!("unknown ID {}", header.id);
                        return Some(Err(self.resync(message)));
                    }
                    self.state = FramerState::InFrame(header);
                }
                FramerState::InFrame(header) => {
                    let payload = &self.buf[header.len..];
                    let Some(layout) = self.layouts.get(&header.id) else {
                        return Some(Err(self.resync(format!("unknown ID {}", header.id))));
                    };

                    let payload_len = match (layout.measure(payload, self.endianness), header.declared_len) {
                        (Measure::TooLong(n), _) => {
                            let message = format!("ID {} payload of {} bytes too long", header.id, n);
                            return Some(Err(self.resync(message)));
                        }
                        (Measure::Need(_), None) => return None,
                        (Measure::Done(n), None) => n,
                        (measured, Some(declared)) => {
                            if payload.len() < declared {
                                return None;
                            }
                            match layout.measure(&payload[..declared], self.endianness) {
                                Measure::Done(n) if n == declared => n,
                                _ => {
                                    let message = format!(
                                        "ID {} declares {} payload bytes, layout needs {:?}",
                                        header.id, declared, measured
                                    );
                                    return Some(Err(self.resync(message)));
                                }
                            }
                        }
                    };

                    // Emit
                    let params = layout.to_host(&payload[..payload_len], self.endianness);
                    let record = TraceRecord {
                        id: header.id,
                        stamp: header.stamp,
                        timestamp: header.timestamp,
                        params,
                    };
                    self.buf.drain(..header.len + payload_len);
                    self.state = FramerState::Syncing;
                    self.stats.records += 1;
                    return Some(Ok(record));
                }
            }
        }
    }

    /// Drain every complete record from the buffer
    pub fn records(&mut self) -> Vec<Result<TraceRecord>> {
        std::iter::from_fn(|| self.next_record()).collect()
    }

    fn resync(&mut self, message: String) -> TriceError {
        self.stats.framing_errors += 1;
        if !self.buf.is_empty() {
            self.buf.remove(0);
        }
        self.state = FramerState::Syncing;
        let error = TriceError::Framing(message);
        tracing::debug!("{}", error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::wire::{pack_params, FrameEncoder, ParamValue};
    use crate::types::TriceFmt;

    fn table() -> FormatTable {
        [
            (TriceId(100), TriceFmt::new("TRICE8_2", "%d %d")),
            (TriceId(200), TriceFmt::new("TRICE_S", "sig:%s")),
            (TriceId(300), TriceFmt::new("TRICE32", "%x")),
        ]
        .into_iter()
        .collect()
    }

    fn encode(config: &FramerConfig, id: u32, values: &[ParamValue]) -> (Vec<u8>, Vec<u8>) {
        let table = table();
        let layout = ParamLayout::from_fmt(table.get(TriceId(id)).unwrap()).unwrap();
        let params = pack_params(&layout, values);
        let frame = FrameEncoder::new(config.format, config.endianness).encode(
            TriceId(id),
            StampWidth::Bits32,
            0x3232_3232,
            &layout,
            &params,
        );
        (frame, params)
    }

    #[test]
    fn test_single_frame() {
        let config = FramerConfig::default();
        let (frame, params) = encode(&config, 100, &[ParamValue::Int(-1), ParamValue::Int(2)]);
        let mut framer = StreamFramer::new(&table(), config);
        framer.push(&frame);
        let record = framer.next_record().unwrap().unwrap();
        assert_eq!(record.id, TriceId(100));
        assert_eq!(record.timestamp, 0x3232_3232);
        assert_eq!(record.params, params);
        assert!(framer.next_record().is_none());
    }

    #[test]
    fn test_fragmented_delivery() {
        let config = FramerConfig {
            endianness: Endianness::Big,
            ..FramerConfig::default()
        };
        let (frame, params) = encode(&config, 200, &[ParamValue::Str("hello".into())]);
        let mut framer = StreamFramer::new(&table(), config);
        for byte in &frame[..frame.len() - 1] {
            framer.push(std::slice::from_ref(byte));
            assert!(framer.next_record().is_none());
        }
        framer.push(&frame[frame.len() - 1..]);
        assert_eq!(framer.next_record().unwrap().unwrap().params, params);
    }

    #[test]
    fn test_garbage_and_unknown_id_resync() {
        let config = FramerConfig::default();
        let (good, _) = encode(&config, 300, &[ParamValue::Int(7)]);
        let mut stream = vec![0x00, 0x11, SYNC, 0x00, 0x99, 0x99];
        stream.extend_from_slice(&good);

        let mut framer = StreamFramer::new(&table(), config);
        framer.push(&stream);
        let results = framer.records();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(TriceError::Framing(_))));
        assert_eq!(results[1].as_ref().unwrap().id, TriceId(300));
        assert_eq!(framer.stats().framing_errors, 1);
        assert_eq!(framer.stats().records, 1);
    }

    #[test]
    fn test_explicit_length_mismatch() {
        let config = FramerConfig {
            format: FrameFormat::ExplicitLength,
            ..FramerConfig::default()
        };
        let (mut frame, _) = encode(&config, 100, &[ParamValue::Int(1), ParamValue::Int(2)]);
        // declared length 2 -> 3
        frame[4] = 3;
        frame.push(0);
        let mut framer = StreamFramer::new(&table(), config);
        framer.push(&frame);
        assert!(matches!(framer.next_record(), Some(Err(TriceError::Framing(_)))));
    }

    #[test]
    fn test_encrypted_stream() {
        let cipher = Xtea::from_passphrase("MySecret").unwrap();
        let config = FramerConfig {
            cipher: Some(cipher.clone()),
            ..FramerConfig::default()
        };
        let (mut frame, params) = encode(&config, 300, &[ParamValue::Int(0x55)]);
        while frame.len() % 8 != 0 {
            frame.push(0);
        }
        cipher.encrypt(&mut frame);

        let mut framer = StreamFramer::new(&table(), config);
        framer.push(&frame);
        assert_eq!(framer.next_record().unwrap().unwrap().params, params);
    }
}
