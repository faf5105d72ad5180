//! Persisted ID tables
//!
//! - [`FormatTable`] (`til.json`) maps each ID to its [`TriceFmt`]. It is the
//!   contract between the firmware sources and the decoder.
//! - [`ReverseIndex`] inverts the format table so a known format can be
//!   resolved back to an existing ID.
//! - [`LocationTable`] (`li.json`) maps each ID to where it was last seen in
//!   the source tree. It is diagnostic only and never drives ID assignment.
//!
//! Both files are JSON objects keyed by the decimal ID. Keys are written in
//! ascending numeric order so repeated writes of an unchanged table are
//! byte-identical.

use crate::error::{Result, TriceError};
use crate::types::{TriceFmt, TriceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Spellings that disable reading and writing the location table
pub const DISABLED_TABLE_NAMES: [&str; 2] = ["off", "none"];

/// Check whether a table file name is the "do not read or write" sentinel
pub fn is_disabled(name: &Path) -> bool {
    name.to_str()
        .map(|s| DISABLED_TABLE_NAMES.contains(&s))
        .unwrap_or(false)
}

fn read_json<T>(path: &Path) -> Result<Option<T>>
where
    T: for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| TriceError::persistence(path, e))?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| TriceError::persistence(path, format!("failed to parse: {}", e)))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| TriceError::persistence(path, e))?;
        }
    }
    let mut content = serde_json::to_string_pretty(value)
        .map_err(|e| TriceError::persistence(path, format!("failed to serialize: {}", e)))?;
    content.push('\n');
    std::fs::write(path, content).map_err(|e| TriceError::persistence(path, e))
}

// ==================== Format Table ====================

/// Mapping ID → format, the persisted source of truth
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatTable {
    entries: BTreeMap<TriceId, TriceFmt>,
}

impl FormatTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from disk, an absent or empty file yields an empty table
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match read_json(path)? {
            Some(table) => Ok(table),
            None => {
                tracing::warn!("ID list {:?} not found, starting with an empty list", path);
                Ok(Self::new())
            }
        }
    }

    /// Write the table sorted by ID
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the format of an ID
    pub fn get(&self, id: TriceId) -> Option<&TriceFmt> {
        self.entries.get(&id)
    }

    /// Whether the ID has an entry
    pub fn contains(&self, id: TriceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Insert a new entry. An existing entry is never replaced; its format
    /// is returned as the error value instead.
    pub fn insert(&mut self, id: TriceId, fmt: TriceFmt) -> std::result::Result<(), &TriceFmt> {
        if self.entries.contains_key(&id) {
            return Err(&self.entries[&id]);
        }
        self.entries.insert(id, fmt);
        Ok(())
    }

    /// Iterate entries in ascending ID order
    pub fn iter(&self) -> impl Iterator<Item = (TriceId, &TriceFmt)> {
        self.entries.iter().map(|(id, f)| (*id, f))
    }

    /// All IDs in ascending order
    pub fn ids(&self) -> impl Iterator<Item = TriceId> + '_ {
        self.entries.keys().copied()
    }

    /// Build the format → IDs index
    pub fn reverse_index(&self) -> ReverseIndex {
        let mut index = ReverseIndex::default();
        for (id, fmt) in self.iter() {
            index.push(fmt.clone(), id);
        }
        index
    }
}

impl FromIterator<(TriceId, TriceFmt)> for FormatTable {
    fn from_iter<I: IntoIterator<Item = (TriceId, TriceFmt)>>(iter: I) -> Self {
        let mut table = FormatTable::new();
        for (id, fmt) in iter {
            if let Err(kept) = table.insert(id, fmt.clone()) {
                tracing::warn!("Duplicate ID {}: kept {}, dropped {}", id, kept, fmt);
            }
        }
        table
    }
}

// ==================== Reverse Index ====================

/// Mapping format → IDs in the order they were recorded
#[derive(Debug, Clone, Default)]
pub struct ReverseIndex {
    ids: HashMap<TriceFmt, Vec<TriceId>>,
}

impl ReverseIndex {
    /// First recorded ID for a format
    pub fn first(&self, fmt: &TriceFmt) -> Option<TriceId> {
        self.ids.get(fmt).and_then(|ids| ids.first().copied())
    }

    /// All IDs recorded for a format
    pub fn all(&self, fmt: &TriceFmt) -> &[TriceId] {
        self.ids.get(fmt).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record an ID for a format
    pub fn push(&mut self, fmt: TriceFmt, id: TriceId) {
        self.ids.entry(fmt).or_default().push(id);
    }

    /// Number of distinct formats
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no formats are indexed
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ==================== Location Table ====================

/// A source position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Path relative to the walked tree root, `/` separated
    #[serde(rename = "File")]
    pub file: String,
    /// 1-based line number
    #[serde(rename = "Line")]
    pub line: usize,
}

impl Location {
    /// Create a new location
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Mapping ID → source location, rebuilt on every pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationTable {
    entries: BTreeMap<TriceId, Location>,
}

impl LocationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from disk; disabled names and absent files yield an empty table
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if is_disabled(path) {
            return Ok(Self::new());
        }
        Ok(read_json(path)?.unwrap_or_default())
    }

    /// Replace the file on disk, a disabled name is a no-op
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if is_disabled(path) {
            return Ok(());
        }
        write_json(path, self)
    }

    /// Record where an ID was seen; the first location of a pass is kept
    pub fn record(&mut self, id: TriceId, location: Location) {
        self.entries.entry(id).or_insert(location);
    }

    /// Location of an ID
    pub fn get(&self, id: TriceId) -> Option<&Location> {
        self.entries.get(&id)
    }

    /// Whether the ID has a location
    pub fn contains(&self, id: TriceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All IDs in ascending order
    pub fn ids(&self) -> impl Iterator<Item = TriceId> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_never_overwrites() {
        let mut table = FormatTable::new();
        assert!(table.insert(TriceId(7), TriceFmt::new("TRICE8", "a")).is_ok());
        let existing = table
            .insert(TriceId(7), TriceFmt::new("TRICE8", "b"))
            .unwrap_err();
        assert_eq!(existing.format_string, "a");
        assert_eq!(table.get(TriceId(7)).unwrap().format_string, "a");
    }

    #[test]
    fn test_collect_keeps_first_duplicate() {
        let table: FormatTable = [
            (TriceId(3), TriceFmt::new("TRICE", "first")),
            (TriceId(3), TriceFmt::new("TRICE", "second")),
            (TriceId(4), TriceFmt::new("TRICE", "other")),
        ]
        .into_iter()
        .collect();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(TriceId(3)).unwrap().format_string, "first");
    }

    #[test]
    fn test_numeric_key_order() {
        let table: FormatTable = [
            (TriceId(45), TriceFmt::new("TRICE", "x")),
            (TriceId(123), TriceFmt::new("TRICE", "y")),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string_pretty(&table).unwrap();
        assert!(json.find("\"45\"").unwrap() < json.find("\"123\"").unwrap());
    }

    #[test]
    fn test_save_load_is_byte_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("til.json");
        let table: FormatTable = [
            (TriceId(12345), TriceFmt::new("TRICE16_3", "hi %2d, %13u, %64b\\n")),
            (TriceId(12344), TriceFmt::new("Trice16_1", "hi %2d\\n")),
        ]
        .into_iter()
        .collect();
        table.save(&path).unwrap();
        let first = std::fs::read(&path).unwrap();

        let loaded = FormatTable::load(&path).unwrap();
        assert_eq!(loaded, table);
        loaded.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);

        let text = String::from_utf8(first).unwrap();
        assert!(text.contains("\"Type\": \"TRICE16_3\""));
        assert!(text.contains("\"Strg\": \"hi %2d\\\\n\""));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let table = FormatTable::load(dir.path().join("absent.json")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("til.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FormatTable::load(&path).unwrap_err();
        assert!(matches!(err, TriceError::Persistence { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_reverse_index_first_is_lowest() {
        let fmt = TriceFmt::new("TRICE8_1", "hi %d");
        let table: FormatTable = [
            (TriceId(10004), fmt.clone()),
            (TriceId(10003), fmt.clone()),
        ]
        .into_iter()
        .collect();
        let index = table.reverse_index();
        assert_eq!(index.first(&fmt), Some(TriceId(10003)));
        assert_eq!(index.all(&fmt).len(), 2);
    }

    #[test]
    fn test_location_table_disabled() {
        let mut li = LocationTable::new();
        li.record(TriceId(1), Location::new("main.c", 3));
        li.record(TriceId(1), Location::new("other.c", 9));
        assert_eq!(li.get(TriceId(1)).unwrap().file, "main.c");
        assert!(li.save("off").is_ok());
        assert!(LocationTable::load("none").unwrap().is_empty());
    }
}
