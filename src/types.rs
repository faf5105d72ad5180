//! Core data types for trice-rs
//!
//! This module contains the fundamental data structures shared by the ID
//! registry (build-time path) and the decoder (run-time path).
//!
//! # Main Types
//!
//! - [`TriceId`] - Numeric key of a trice format, `0` is the "unassigned" sentinel
//! - [`IdRange`] - Closed range of IDs the registry may allocate from
//! - [`TriceFmt`] - The `(macroType, formatString)` pair persisted per ID
//! - [`MacroType`] - Decoded view of a macro type token (width, arity, casing)
//! - [`IdWrapper`] - The `id`/`Id`/`ID`/`iD` spellings wrapping a call-site ID
//!
//! # Macro Type Tokens
//!
//! A macro type token such as `TRice16_2` encodes three orthogonal facts:
//!
//! - **Casing** (`TRICE`, `trice`, `Trice`, `TRice`) - historically the
//!   timestamp width, preserved verbatim because it is part of identity
//! - **Width** (`8`, `16`, `32`, `64`, or absent for the legacy 32-bit width)
//! - **Arity** (`_<n>` fixes the count, `_S`/`_N` carry one string, absent
//!   means the count follows from the format string)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric key identifying a trice format
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct TriceId(pub u32);

impl TriceId {
    /// The reserved "not yet assigned" value written as `Id(0)` in sources
    pub const SENTINEL: TriceId = TriceId(0);

    /// Whether this is the unassigned sentinel
    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }

    /// Raw numeric value
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TriceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TriceId {
    fn from(value: u32) -> Self {
        TriceId(value)
    }
}

// ==================== ID Range ====================

/// Closed range `[min, max]` of allocatable IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    /// Smallest allocatable ID (never 0)
    pub min: u32,
    /// Largest allocatable ID
    pub max: u32,
}

impl IdRange {
    /// 14-bit range used by legacy deployments
    pub const LEGACY: IdRange = IdRange { min: 1, max: 16383 };

    /// Current default range, fits the 16-bit wire ID
    pub const DEFAULT: IdRange = IdRange { min: 1, max: 65535 };

    /// Create a new range
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    /// Check whether `id` lies inside the range
    pub fn contains(&self, id: TriceId) -> bool {
        self.min <= id.0 && id.0 <= self.max
    }

    /// Number of IDs in the range
    pub fn len(&self) -> usize {
        if self.max < self.min {
            0
        } else {
            (self.max - self.min) as usize + 1
        }
    }

    /// Whether the range holds no IDs
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject ranges that could hand out the sentinel or are inverted
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.min == 0 {
            return Err("ID range must not include the sentinel 0".to_string());
        }
        if self.min > self.max {
            return Err(format!("ID range min {} exceeds max {}", self.min, self.max));
        }
        Ok(())
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

// ==================== Stamp Width ====================

/// Width of the device timestamp carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StampWidth {
    /// No timestamp
    #[default]
    None,
    /// 16-bit timestamp
    Bits16,
    /// 32-bit timestamp
    Bits32,
}

impl StampWidth {
    /// Number of stamp bits (0, 16 or 32)
    pub fn bits(self) -> u8 {
        match self {
            StampWidth::None => 0,
            StampWidth::Bits16 => 16,
            StampWidth::Bits32 => 32,
        }
    }

    /// Number of stamp bytes on the wire
    pub fn byte_len(self) -> usize {
        self.bits() as usize / 8
    }

    /// Two-bit code used in the frame flags byte
    pub fn code(self) -> u8 {
        match self {
            StampWidth::None => 0,
            StampWidth::Bits16 => 1,
            StampWidth::Bits32 => 2,
        }
    }

    /// Decode the two-bit flags code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StampWidth::None),
            1 => Some(StampWidth::Bits16),
            2 => Some(StampWidth::Bits32),
            _ => None,
        }
    }
}

// ==================== Macro Casing ====================

/// Casing of the macro name, kept verbatim as part of identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroCase {
    /// `TRICE...`
    Upper,
    /// `trice...`
    Lower,
    /// `Trice...`
    Capital,
    /// `TRice...`
    DoubleCapital,
}

impl MacroCase {
    /// Recognised macro name spellings
    pub const SPELLINGS: [(&'static str, MacroCase); 4] = [
        ("TRICE", MacroCase::Upper),
        ("TRice", MacroCase::DoubleCapital),
        ("Trice", MacroCase::Capital),
        ("trice", MacroCase::Lower),
    ];

    /// Stamp width implied by the casing when the ID wrapper defers to it
    pub fn implied_stamp(self) -> StampWidth {
        match self {
            MacroCase::Upper | MacroCase::Lower => StampWidth::None,
            MacroCase::Capital => StampWidth::Bits16,
            MacroCase::DoubleCapital => StampWidth::Bits32,
        }
    }
}

// ==================== ID Wrapper ====================

/// How an ID wrapper spelling determines the stamp width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampSource {
    /// The wrapper itself fixes the width
    Fixed(StampWidth),
    /// The macro casing decides
    FromMacroCase,
}

/// The wrapper around a call-site ID, e.g. `Id(42)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdWrapper {
    /// `id(n)`
    NoStamp,
    /// `Id(n)`
    Stamp16,
    /// `ID(n)`
    Stamp32,
    /// `iD(n)`
    CaseStamp,
}

/// Single lookup table mapping wrapper spelling to stamp behavior
const WRAPPER_TABLE: [(&str, IdWrapper, StampSource); 4] = [
    ("id", IdWrapper::NoStamp, StampSource::Fixed(StampWidth::None)),
    ("Id", IdWrapper::Stamp16, StampSource::Fixed(StampWidth::Bits16)),
    ("ID", IdWrapper::Stamp32, StampSource::Fixed(StampWidth::Bits32)),
    ("iD", IdWrapper::CaseStamp, StampSource::FromMacroCase),
];

impl IdWrapper {
    /// Look up a wrapper by its exact spelling
    pub fn from_spelling(spelling: &str) -> Option<Self> {
        WRAPPER_TABLE
            .iter()
            .find(|(s, _, _)| *s == spelling)
            .map(|(_, w, _)| *w)
    }

    /// Source spelling of this wrapper
    pub fn spelling(self) -> &'static str {
        WRAPPER_TABLE
            .iter()
            .find(|(_, w, _)| *w == self)
            .map(|(s, _, _)| *s)
            .unwrap_or("id")
    }

    /// Stamp rule for this wrapper
    pub fn stamp_source(self) -> StampSource {
        WRAPPER_TABLE
            .iter()
            .find(|(_, w, _)| *w == self)
            .map(|(_, _, src)| *src)
            .unwrap_or(StampSource::Fixed(StampWidth::None))
    }

    /// Resolve the stamp width for a call site using this wrapper
    pub fn stamp_width(self, case: MacroCase) -> StampWidth {
        match self.stamp_source() {
            StampSource::Fixed(width) => width,
            StampSource::FromMacroCase => case.implied_stamp(),
        }
    }
}

// ==================== Macro Type ====================

/// Parameter bit width of a macro type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamWidth {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

impl ParamWidth {
    /// Width used by untyped legacy macros such as `TRICE`
    pub const LEGACY: ParamWidth = ParamWidth::Bits32;

    /// Width in bits
    pub fn bits(self) -> u32 {
        match self {
            ParamWidth::Bits8 => 8,
            ParamWidth::Bits16 => 16,
            ParamWidth::Bits32 => 32,
            ParamWidth::Bits64 => 64,
        }
    }

    /// Width in bytes
    pub fn bytes(self) -> usize {
        self.bits() as usize / 8
    }

    fn from_bits(bits: &str) -> Option<Self> {
        match bits {
            "8" => Some(ParamWidth::Bits8),
            "16" => Some(ParamWidth::Bits16),
            "32" => Some(ParamWidth::Bits32),
            "64" => Some(ParamWidth::Bits64),
            _ => None,
        }
    }
}

/// How many parameters a macro carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Count fixed by a numeric suffix, e.g. `TRICE16_3`
    Fixed(usize),
    /// Count follows from the format string's conversion specifiers
    Inferred,
    /// One length-prefixed string parameter (`_S` / `_N`)
    String,
}

/// Decoded view of a macro type token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MacroType {
    /// Casing of the name
    pub case: MacroCase,
    /// Parameter width
    pub width: ParamWidth,
    /// Whether the width was written explicitly
    pub explicit_width: bool,
    /// Parameter count rule
    pub arity: Arity,
}

impl MacroType {
    /// Parse a macro type token such as `TRICE8_1`, `Trice16`, `TRICE_S`
    pub fn parse(token: &str) -> Option<Self> {
        let (case, rest) = MacroCase::SPELLINGS
            .iter()
            .find_map(|(name, case)| token.strip_prefix(name).map(|rest| (*case, rest)))?;

        let (bits, suffix) = match rest.find('_') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };

        let (width, explicit_width) = if bits.is_empty() {
            (ParamWidth::LEGACY, false)
        } else {
            (ParamWidth::from_bits(bits)?, true)
        };

        let arity = match suffix {
            None => Arity::Inferred,
            Some("S") | Some("N") => Arity::String,
            Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
                Arity::Fixed(n.parse().ok()?)
            }
            Some(_) => return None,
        };

        Some(Self {
            case,
            width,
            explicit_width,
            arity,
        })
    }
}

// ==================== Trice Format ====================

/// The persisted `(macroType, formatString)` pair of one ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriceFmt {
    /// Macro type token, casing preserved
    #[serde(rename = "Type")]
    pub macro_type: String,
    /// Format string exactly as written between the quotes in the source
    #[serde(rename = "Strg")]
    pub format_string: String,
}

impl TriceFmt {
    /// Create a new format entry
    pub fn new(macro_type: impl Into<String>, format_string: impl Into<String>) -> Self {
        Self {
            macro_type: macro_type.into(),
            format_string: format_string.into(),
        }
    }

    /// Decode the macro type token
    pub fn macro_info(&self) -> Option<MacroType> {
        MacroType::parse(&self.macro_type)
    }
}

impl fmt::Display for TriceFmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(\"{}\")", self.macro_type, self.format_string)
    }
}
