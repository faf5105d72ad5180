//! ID registry and source synchronization
//!
//! [`IdRegistry`] owns the format table for the duration of one pass over the
//! source tree. A pass runs in three phases:
//!
//! 1. **Load** - read `til.json` and `li.json`, invert the format table and
//!    compute the free [`IdSpace`].
//! 2. **Synchronize** - parse every source file first, withdraw all literal
//!    IDs from the space, then visit call sites in walk order assigning,
//!    reusing or checking IDs. Sources are rewritten in place unless the pass
//!    is a dry run.
//! 3. **Persist** - write the format table if it grew and the rebuilt location
//!    table (full replace).
//!
//! Walk order is the only tie-breaker, so a pass over an unchanged tree is
//! reproducible.

use crate::error::{Result, ResultExt, TriceError};
use crate::id::parser::{apply_edits, CallSite, MacroParser, ParsedSource};
use crate::id::space::{IdPolicy, IdSpace, TableDrift};
use crate::id::table::{FormatTable, Location, LocationTable, ReverseIndex};
use crate::id::walker::{SourceEntry, SourceWalker};
use crate::types::{IdRange, TriceFmt, TriceId};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Options of one synchronization pass
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Allocatable ID range
    pub range: IdRange,
    /// Allocation order
    pub policy: IdPolicy,
    /// Format table file
    pub til: PathBuf,
    /// Location table file, `off`/`none` disables it
    pub li: PathBuf,
    /// Compute everything but leave sources and the format table untouched
    pub dry_run: bool,
    /// Also write reused IDs back into call sites that carried `0`
    pub share_rewrite: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            range: IdRange::DEFAULT,
            policy: IdPolicy::default(),
            til: PathBuf::from("til.json"),
            li: PathBuf::from("li.json"),
            dry_run: false,
            share_rewrite: false,
        }
    }
}

/// One source file as seen by the registry
#[derive(Debug, Clone)]
pub struct SourceText {
    /// Name used in reports and in the location table
    pub name: String,
    /// File contents
    pub text: String,
}

impl SourceText {
    /// Create a new in-memory source
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// How the bytes of a source file map to text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceEncoding {
    #[default]
    Utf8,
    /// Not valid UTF-8, every byte is read as the char of the same value
    Latin1,
}

impl SourceEncoding {
    /// Decode file contents without losing a byte
    pub fn decode(bytes: Vec<u8>) -> (String, Self) {
        match String::from_utf8(bytes) {
            Ok(text) => (text, Self::Utf8),
            Err(e) => {
                let text = e.into_bytes().into_iter().map(char::from).collect();
                (text, Self::Latin1)
            }
        }
    }

    /// Encode text decoded by [`SourceEncoding::decode`] back to file contents
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Latin1 => text
                .chars()
                .map(|c| u8::try_from(c).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// Read a source file as text
fn read_source(path: &Path) -> Result<(String, SourceEncoding)> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (text, encoding) = SourceEncoding::decode(bytes);
    if encoding == SourceEncoding::Latin1 {
        tracing::debug!("{} is not UTF-8, reading it byte-wise", path.display());
    }
    Ok((text, encoding))
}

/// Write a source file back in the encoding it was read with
fn write_source(path: &Path, text: &str, encoding: SourceEncoding) -> Result<()> {
    std::fs::write(path, encoding.encode(text))
        .with_context(|| format!("writing {}", path.display()))
}

/// Outcome of a synchronization pass
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Entries added to the format table, in allocation order
    pub added: Vec<(TriceId, TriceFmt)>,
    /// Call sites with `0` resolved to an already known ID
    pub reused: usize,
    /// Call sites whose ID maps to a different format in the table
    pub collisions: Vec<TriceError>,
    /// Malformed call sites, skipped
    pub parse_errors: Vec<TriceError>,
    /// Files that could not be read or written, skipped
    pub io_errors: Vec<TriceError>,
    /// Keys present in only one of the persisted tables
    pub drift: TableDrift,
    /// Names of sources whose text changed
    pub changed: Vec<String>,
}

impl SyncReport {
    /// Whether the format table grew during the pass
    pub fn table_grew(&self) -> bool {
        !self.added.is_empty()
    }
}

/// The registry for one synchronization pass
#[derive(Debug)]
pub struct IdRegistry {
    options: SyncOptions,
    formats: FormatTable,
    reverse: ReverseIndex,
    previous_locations: LocationTable,
    locations: LocationTable,
    space: IdSpace,
    drift: TableDrift,
}

impl IdRegistry {
    /// Load both tables and prepare the ID space
    pub fn load(options: SyncOptions) -> Result<Self> {
        options
            .range
            .validate()
            .map_err(TriceError::Config)?;
        let formats = FormatTable::load(&options.til)?;
        let previous_locations = LocationTable::load(&options.li)?;
        Ok(Self::from_tables(options, formats, previous_locations))
    }

    /// Build a registry from tables already in memory
    pub fn from_tables(
        options: SyncOptions,
        formats: FormatTable,
        previous_locations: LocationTable,
    ) -> Self {
        let reverse = formats.reverse_index();
        let (space, drift) =
            IdSpace::compute(options.range, options.policy, &formats, &previous_locations);
        tracing::info!(
            "Loaded {} formats, {} locations, {} free IDs in {}",
            formats.len(),
            previous_locations.len(),
            space.remaining(),
            options.range
        );
        Self {
            options,
            formats,
            reverse,
            previous_locations,
            locations: LocationTable::new(),
            space,
            drift,
        }
    }

    /// The format table as it currently stands
    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    /// The location table rebuilt by the last pass
    pub fn locations(&self) -> &LocationTable {
        &self.locations
    }

    /// The location table loaded at the start of the pass
    pub fn previous_locations(&self) -> &LocationTable {
        &self.previous_locations
    }

    /// Options of this pass
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Run the pass over in-memory sources, returning the edited texts
    /// (`None` when a source is unchanged) and the report.
    pub fn synchronize_texts(&mut self, sources: &[SourceText]) -> (Vec<Option<String>>, SyncReport) {
        let parser = MacroParser::new(self.options.range);
        let mut report = SyncReport {
            drift: self.drift.clone(),
            ..SyncReport::default()
        };

        let parsed: Vec<ParsedSource> = sources
            .iter()
            .map(|s| parser.parse(&s.text, &s.name))
            .collect();

        for error in parsed.iter().flat_map(|p| p.errors.iter()) {
            tracing::warn!("{}", error);
        }

        for site in parsed.iter().flat_map(|p| p.sites.iter()) {
            if !site.id.is_sentinel() {
                self.space.reserve(site.id);
            }
        }

        let mut edited = Vec::with_capacity(sources.len());
        for (source, mut file) in sources.iter().zip(parsed) {
            report.parse_errors.append(&mut file.errors);

            let mut edits: Vec<(Range<usize>, String)> = Vec::new();
            for site in &file.sites {
                if let Some(id) = self.visit_site(site, &source.name, &mut report) {
                    edits.push((site.wrapper_span.clone(), site.wrapper_text(id)));
                }
            }

            let new_text = apply_edits(&source.text, &edits);
            if new_text != source.text {
                report.changed.push(source.name.clone());
                edited.push(Some(new_text));
            } else {
                edited.push(None);
            }
        }

        (edited, report)
    }

    /// Handle one call site, returning the ID to write back if any
    fn visit_site(
        &mut self,
        site: &CallSite,
        origin: &str,
        report: &mut SyncReport,
    ) -> Option<TriceId> {
        let fmt = site.fmt();
        let location = Location::new(origin, site.line);

        if site.id.is_sentinel() {
            if let Some(id) = self.reverse.first(&fmt) {
                tracing::debug!("{} reuses ID {} for {}", location, id, fmt);
                report.reused += 1;
                self.locations.record(id, location);
                return self.options.share_rewrite.then_some(id);
            }

            let Some(id) = self.space.next_id() else {
                let error = TriceError::Parse {
                    location: location.to_string(),
                    message: format!("no free ID left in {}", self.options.range),
                };
                tracing::warn!("{}", error);
                report.parse_errors.push(error);
                return None;
            };

            tracing::info!("{} gets new ID {} for {}", location, id, fmt);
            self.add(id, fmt, report);
            self.locations.record(id, location);
            return Some(id);
        }

        match self.formats.get(site.id) {
            Some(existing) if *existing != fmt => {
                let error = TriceError::Collision {
                    id: site.id,
                    kept: existing.to_string(),
                    rejected: fmt.to_string(),
                    location: location.to_string(),
                };
                tracing::warn!("{}", error);
                report.collisions.push(error);
            }
            Some(_) => {}
            None => {
                tracing::info!("{} adds literal ID {} for {}", location, site.id, fmt);
                self.add(site.id, fmt, report);
            }
        }
        self.locations.record(site.id, location);
        None
    }

    fn add(&mut self, id: TriceId, fmt: TriceFmt, report: &mut SyncReport) {
        if self.formats.insert(id, fmt.clone()).is_ok() {
            self.reverse.push(fmt.clone(), id);
            report.added.push((id, fmt));
        }
    }

    /// Run the pass over the files of `walker`, rewriting them unless this is
    /// a dry run. Unreadable or unwritable files are reported and skipped.
    pub fn synchronize(&mut self, walker: &SourceWalker) -> SyncReport {
        self.synchronize_entries(walker.files())
    }

    /// Run the pass over already collected source entries
    pub fn synchronize_entries(&mut self, entries: Vec<SourceEntry>) -> SyncReport {
        let mut io_errors = Vec::new();
        let mut paths = Vec::new();
        let mut sources = Vec::new();

        for entry in entries {
            match read_source(&entry.path) {
                Ok((text, encoding)) => {
                    sources.push(SourceText::new(entry.relative, text));
                    paths.push((entry.path, encoding));
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    io_errors.push(e);
                }
            }
        }

        let (edited, mut report) = self.synchronize_texts(&sources);
        report.io_errors = io_errors;

        if self.options.dry_run {
            if !report.changed.is_empty() {
                tracing::info!("Dry run: {} files would change", report.changed.len());
            }
            return report;
        }

        for ((path, encoding), text) in paths.iter().zip(edited) {
            let Some(text) = text else { continue };
            if let Err(e) = write_source(path, &text, *encoding) {
                tracing::warn!("{}", e);
                report.io_errors.push(e);
            }
        }
        report
    }

    /// Write the tables back. The format table is written only when it grew
    /// and the pass is not a dry run; the location table is always replaced
    /// unless disabled.
    pub fn persist(&self, report: &SyncReport) -> Result<()> {
        if report.table_grew() && !self.options.dry_run {
            self.formats.save(&self.options.til)?;
            tracing::info!(
                "Wrote {} entries (+{}) to {:?}",
                self.formats.len(),
                report.added.len(),
                self.options.til
            );
        }
        self.locations.save(&self.options.li)?;
        Ok(())
    }
}

/// Load, synchronize and persist in one call
pub fn update(options: SyncOptions, walker: &SourceWalker) -> Result<SyncReport> {
    let mut registry = IdRegistry::load(options)?;
    let report = registry.synchronize(walker);
    registry.persist(&report)?;
    tracing::info!(
        "Sync done: {} new, {} reused, {} collisions, {} parse errors, {} files changed",
        report.added.len(),
        report.reused,
        report.collisions.len(),
        report.parse_errors.len(),
        report.changed.len()
    );
    Ok(report)
}

// ==================== Zeroing ====================

/// Outcome of resetting call-site IDs
#[derive(Debug, Default)]
pub struct ZeroReport {
    /// Number of call sites reset to `0`
    pub zeroed: usize,
    /// Names of sources whose text changed
    pub changed: Vec<String>,
    /// Malformed sites and file errors
    pub errors: Vec<TriceError>,
}

/// Reset every embedded ID of `text` to the sentinel
pub fn zero_text(text: &str, origin: &str) -> (String, usize, Vec<TriceError>) {
    let parser = MacroParser::new(IdRange::new(1, u32::MAX));
    let parsed = parser.parse(text, origin);
    let edits: Vec<(Range<usize>, String)> = parsed
        .sites
        .iter()
        .filter(|s| !s.id.is_sentinel())
        .map(|s| (s.wrapper_span.clone(), s.wrapper_text(TriceId::SENTINEL)))
        .collect();
    (apply_edits(text, &edits), edits.len(), parsed.errors)
}

/// Reset every embedded ID below the walker's roots to `0`
pub fn zero_source_tree(walker: &SourceWalker, dry_run: bool) -> ZeroReport {
    let mut report = ZeroReport::default();
    for entry in walker.files() {
        let (text, encoding) = match read_source(&entry.path) {
            Ok(read) => read,
            Err(e) => {
                tracing::warn!("{}", e);
                report.errors.push(e);
                continue;
            }
        };

        let (new_text, zeroed, mut errors) = zero_text(&text, &entry.relative);
        for e in &errors {
            tracing::warn!("{}", e);
        }
        report.errors.append(&mut errors);
        if zeroed == 0 {
            continue;
        }
        report.zeroed += zeroed;
        report.changed.push(entry.relative.clone());

        if dry_run {
            continue;
        }
        if let Err(e) = write_source(&entry.path, &new_text, encoding) {
            tracing::warn!("{}", e);
            report.errors.push(e);
        }
    }
    tracing::info!(
        "Zeroed {} IDs in {} files{}",
        report.zeroed,
        report.changed.len(),
        if dry_run { " (dry run)" } else { "" }
    );
    report
}
