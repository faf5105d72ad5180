//! Configuration sections
//!
//! - [`IdSettings`] - `[id]`, used by `trice update` and `trice zero`
//! - [`LogSettings`] - `[log]`, used by `trice log` and `trice check`
//!
//! Every field has a default, so a partial file (or none at all) is valid.

use crate::decoder::{Endianness, FrameFormat, NO_ENCRYPTION};
use crate::id::IdPolicy;
use crate::types::IdRange;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default queued chunks between receiver and decoder
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default read size of the receiver
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

// ==================== ID Settings ====================

/// `[id]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdSettings {
    /// Smallest allocatable ID
    pub min: u32,

    /// Largest allocatable ID
    pub max: u32,

    /// Width of the ID field on the wire, 16 or 32
    pub id_bits: u8,

    /// Allocation order of fresh IDs
    pub policy: IdPolicy,

    /// Format table file
    pub til: PathBuf,

    /// Location table file, `off` or `none` disables it
    pub li: PathBuf,

    /// Source trees, walked in this order
    pub sources: Vec<PathBuf>,

    /// Report without writing sources or the format table
    pub dry_run: bool,

    /// Write reused IDs into sharing call sites too
    pub share_rewrite: bool,
}

impl Default for IdSettings {
    fn default() -> Self {
        Self {
            min: IdRange::DEFAULT.min,
            max: IdRange::DEFAULT.max,
            id_bits: 16,
            policy: IdPolicy::Upward,
            til: PathBuf::from("til.json"),
            li: PathBuf::from("li.json"),
            sources: vec![PathBuf::from("./")],
            dry_run: false,
            share_rewrite: false,
        }
    }
}

impl IdSettings {
    /// The configured range
    pub fn range(&self) -> IdRange {
        IdRange::new(self.min, self.max)
    }

    /// Largest ID the wire ID field can carry
    pub fn wire_max(&self) -> Option<u32> {
        match self.id_bits {
            16 => Some(u16::MAX as u32),
            32 => Some(u32::MAX),
            _ => None,
        }
    }
}

// ==================== Log Settings ====================

/// `[log]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// How frame lengths are determined
    pub encoding: FrameFormat,

    /// Byte order of the device
    pub endianness: Endianness,

    /// Encryption pass-phrase, `none` disables decryption
    pub password: String,

    /// Host timestamp format (`LOCmicro`, `UTCmicro`, `off`, `zero` or literal text)
    pub timestamp: String,

    /// Text placed after the timestamp
    pub prefix: String,

    /// Text placed after each line
    pub suffix: String,

    /// Show the device timestamp column
    pub target_stamp: bool,

    pub channel_capacity: usize,

    pub chunk_size: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            encoding: FrameFormat::TypeDerived,
            endianness: Endianness::Little,
            password: NO_ENCRYPTION.to_string(),
            timestamp: "LOCmicro".to_string(),
            prefix: String::new(),
            suffix: String::new(),
            target_stamp: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
