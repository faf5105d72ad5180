//! Wire frame layout
//!
//! ```text
//! byte 0     sync 0xEB
//! byte 1     flags: bits 0-1 stamp code (0 none, 1 16-bit, 2 32-bit)
//!                   bit  2   ID width (0 = u16, 1 = u32)
//!                   bits 3-7 reserved, zero
//! id         2 or 4 bytes
//! [len]      u16 payload length (explicit-length frames only)
//! stamp      0, 2 or 4 bytes
//! payload    parameters as described by the ID's ParamLayout
//! ```
//!
//! All multi-byte fields use the configured transfer endianness.

use crate::decoder::printf::value_specs;
use crate::types::{Arity, ParamWidth, StampWidth, TriceFmt, TriceId};
use serde::{Deserialize, Serialize};

/// Frame start marker
pub const SYNC: u8 = 0xEB;

/// Largest payload accepted from the wire
pub const MAX_PAYLOAD: usize = 4096;

const FLAG_STAMP_MASK: u8 = 0b0000_0011;
const FLAG_WIDE_ID: u8 = 0b0000_0100;
const FLAG_RESERVED: u8 = 0b1111_1000;

/// How the payload length of a frame is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    /// Length follows from the registered format and inline string lengths
    #[default]
    TypeDerived,
    /// A u16 payload length follows the ID and must match the layout
    ExplicitLength,
}

/// Byte order of multi-byte fields on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// Byte order of the decoding host
    pub const NATIVE: Endianness = if cfg!(target_endian = "big") {
        Endianness::Big
    } else {
        Endianness::Little
    };

    /// Whether fields must be swapped to reach host order
    pub fn needs_swap(self) -> bool {
        self != Self::NATIVE
    }

    /// Read an unsigned value of `bytes.len()` (1, 2, 4 or 8) bytes
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        match self {
            Endianness::Big => bytes.iter().fold(0, fold),
            Endianness::Little => bytes.iter().rev().fold(0, fold),
        }
    }

    /// Write the low `len` bytes of `value`
    pub fn write_uint(self, value: u64, len: usize, out: &mut Vec<u8>) {
        let le = value.to_le_bytes();
        match self {
            Endianness::Little => out.extend_from_slice(&le[..len]),
            Endianness::Big => out.extend(le[..len].iter().rev()),
        }
    }
}

impl std::str::FromStr for Endianness {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "little" | "littleendian" => Ok(Endianness::Little),
            "big" | "bigendian" => Ok(Endianness::Big),
            other => Err(format!("unknown endianness `{}`", other)),
        }
    }
}

impl std::str::FromStr for FrameFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "type_derived" | "type-derived" => Ok(FrameFormat::TypeDerived),
            "explicit_length" | "explicit-length" => Ok(FrameFormat::ExplicitLength),
            other => Err(format!("unknown frame encoding `{}`", other)),
        }
    }
}

// ==================== Header ====================

/// Decoded fixed part of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: TriceId,
    pub stamp: StampWidth,
    pub timestamp: u32,
    /// Declared payload length, explicit-length frames only
    pub declared_len: Option<usize>,
    /// Header size in bytes
    pub len: usize,
}

/// Outcome of parsing a header at the start of a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderParse {
    Complete(FrameHeader),
    Incomplete,
    Invalid(String),
}

/// Parse a frame header; `buf[0]` must be the sync byte
pub fn parse_header(buf: &[u8], format: FrameFormat, endianness: Endianness) -> HeaderParse {
    if buf.len() < 2 {
        return HeaderParse::Incomplete;
    }
    let flags = buf[1];
    if flags & FLAG_RESERVED != 0 {
        return HeaderParse::Invalid(format!("reserved flag bits set in {:#04x}", flags));
    }
    let Some(stamp) = StampWidth::from_code(flags & FLAG_STAMP_MASK) else {
        return HeaderParse::Invalid(format!("invalid stamp code in {:#04x}", flags));
    };
    let id_len = if flags & FLAG_WIDE_ID != 0 { 4 } else { 2 };
    let len_len = match format {
        FrameFormat::TypeDerived => 0,
        FrameFormat::ExplicitLength => 2,
    };
    let header_len = 2 + id_len + len_len + stamp.byte_len();
    if buf.len() < header_len {
        return HeaderParse::Incomplete;
    }

    let mut pos = 2;
    let id = TriceId(endianness.read_uint(&buf[pos..pos + id_len]) as u32);
    pos += id_len;

    let declared_len = if len_len > 0 {
        let len = endianness.read_uint(&buf[pos..pos + 2]) as usize;
        pos += 2;
        if len > MAX_PAYLOAD {
            return HeaderParse::Invalid(format!("declared length {} exceeds {}", len, MAX_PAYLOAD));
        }
        Some(len)
    } else {
        None
    };

    let timestamp = endianness.read_uint(&buf[pos..pos + stamp.byte_len()]) as u32;

    HeaderParse::Complete(FrameHeader {
        id,
        stamp,
        timestamp,
        declared_len,
        len: header_len,
    })
}

// ==================== Parameter Layout ====================

/// One parameter slot of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Fixed-width numeric value
    Value(ParamWidth),
    /// u16 length followed by that many bytes
    Str,
}

/// Outcome of measuring a payload against a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// The payload is this many bytes long
    Done(usize),
    /// At least this many bytes are needed to continue
    Need(usize),
    /// A string length runs past [`MAX_PAYLOAD`]
    TooLong(usize),
}

/// Sequence of parameter slots derived from a registered format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLayout {
    slots: Vec<Slot>,
}

impl ParamLayout {
    /// Build a layout from explicit slots
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    /// Derive the layout of a registered format
    pub fn from_fmt(fmt: &TriceFmt) -> std::result::Result<Self, String> {
        let info = fmt
            .macro_info()
            .ok_or_else(|| format!("unknown macro type `{}`", fmt.macro_type))?;
        let specs = value_specs(&fmt.format_string);

        let slots = match info.arity {
            Arity::String => vec![Slot::Str],
            Arity::Fixed(count) => (0..count)
                .map(|i| match specs.get(i) {
                    Some(spec) if spec.is_string() => Slot::Str,
                    _ => Slot::Value(info.width),
                })
                .collect(),
            Arity::Inferred => specs
                .iter()
                .map(|spec| {
                    if spec.is_string() {
                        Slot::Str
                    } else {
                        Slot::Value(info.width)
                    }
                })
                .collect(),
        };
        Ok(Self { slots })
    }

    /// Slots in wire order
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the format carries no parameters
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Measure the payload at the start of `payload`
    pub fn measure(&self, payload: &[u8], endianness: Endianness) -> Measure {
        let mut pos = 0;
        for slot in &self.slots {
            match slot {
                Slot::Value(width) => pos += width.bytes(),
                Slot::Str => {
                    if payload.len() < pos + 2 {
                        return Measure::Need(pos + 2);
                    }
                    let len = endianness.read_uint(&payload[pos..pos + 2]) as usize;
                    pos += 2 + len;
                    if pos > MAX_PAYLOAD {
                        return Measure::TooLong(pos);
                    }
                }
            }
        }
        if payload.len() < pos {
            Measure::Need(pos)
        } else {
            Measure::Done(pos)
        }
    }

    /// Convert a measured payload from `transfer` to host byte order
    pub fn to_host(&self, payload: &[u8], transfer: Endianness) -> Vec<u8> {
        self.convert(payload, transfer, transfer)
    }

    /// Convert a host-order payload to `transfer` byte order
    pub fn to_wire(&self, payload: &[u8], transfer: Endianness) -> Vec<u8> {
        self.convert(payload, transfer, Endianness::NATIVE)
    }

    /// Reverse every numeric field; `input` is the order string lengths are read in
    fn convert(&self, payload: &[u8], transfer: Endianness, input: Endianness) -> Vec<u8> {
        let mut out = payload.to_vec();
        if !transfer.needs_swap() {
            return out;
        }
        let mut pos = 0;
        for slot in &self.slots {
            let n = match slot {
                Slot::Value(width) => width.bytes(),
                Slot::Str => 2,
            };
            let Some(field) = out.get_mut(pos..pos + n) else {
                break;
            };
            let skip = match slot {
                Slot::Value(_) => 0,
                Slot::Str => input.read_uint(field) as usize,
            };
            field.reverse();
            pos += n + skip;
        }
        out
    }
}

// ==================== Encoder ====================

/// Builds wire frames, the inverse of the framer
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    pub format: FrameFormat,
    pub endianness: Endianness,
}

impl FrameEncoder {
    /// Create an encoder
    pub fn new(format: FrameFormat, endianness: Endianness) -> Self {
        Self { format, endianness }
    }

    /// Encode one record. `params` are in host byte order and must match `layout`.
    pub fn encode(
        &self,
        id: TriceId,
        stamp: StampWidth,
        timestamp: u32,
        layout: &ParamLayout,
        params: &[u8],
    ) -> Vec<u8> {
        let wide = id.value() > u32::from(u16::MAX);
        let mut flags = stamp.code();
        if wide {
            flags |= FLAG_WIDE_ID;
        }

        let mut out = Vec::with_capacity(12 + params.len());
        out.push(SYNC);
        out.push(flags);
        self.endianness
            .write_uint(u64::from(id.value()), if wide { 4 } else { 2 }, &mut out);
        if self.format == FrameFormat::ExplicitLength {
            self.endianness.write_uint(params.len() as u64, 2, &mut out);
        }
        self.endianness
            .write_uint(u64::from(timestamp), stamp.byte_len(), &mut out);
        out.extend(layout.to_wire(params, self.endianness));
        out
    }
}

/// Host-order parameter bytes for a list of values, handy for building records
pub fn pack_params(layout: &ParamLayout, values: &[ParamValue]) -> Vec<u8> {
    let mut out = Vec::new();
    for (slot, value) in layout.slots().iter().zip(values) {
        match (slot, value) {
            (Slot::Value(width), ParamValue::Int(v)) => {
                Endianness::NATIVE.write_uint(*v as u64, width.bytes(), &mut out)
            }
            (Slot::Value(width), ParamValue::Float(v)) => {
                let bits = match width {
                    ParamWidth::Bits64 => v.to_bits(),
                    _ => u64::from((*v as f32).to_bits()),
                };
                Endianness::NATIVE.write_uint(bits, width.bytes(), &mut out)
            }
            (Slot::Value(width), ParamValue::Str(_)) => {
                Endianness::NATIVE.write_uint(0, width.bytes(), &mut out)
            }
            (Slot::Str, ParamValue::Str(s)) => {
                let bytes = &s.as_bytes()[..s.len().min(MAX_PAYLOAD - 2)];
                out.extend_from_slice(&(bytes.len() as u16).to_ne_bytes());
                out.extend_from_slice(bytes);
            }
            (Slot::Str, _) => out.extend_from_slice(&0u16.to_ne_bytes()),
        }
    }
    out
}

/// A parameter value before packing
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}
