//! Trice macro call-site parser
//!
//! Recognizes call sites of the form
//!
//! ```text
//! MACROTYPE( IDWRAPPER( n ), "format string", args... )
//! ```
//!
//! and turns them into typed [`CallSite`] records. A site whose head
//! (`MACROTYPE( IDWRAPPER(`) matches but whose remainder does not is reported
//! as a parse error and skipped. Rewriting replaces only the `IDWRAPPER( n )`
//! span, so the rest of the line keeps its formatting.

use crate::error::TriceError;
use crate::types::{IdRange, IdWrapper, MacroType, StampWidth, TriceFmt, TriceId};
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

const MACRO_NAME: &str = r"\b(?P<mt>(?:TRICE|TRice|Trice|trice)(?:8|16|32|64)?(?:_(?:\d+|S|N))?)";

/// Start of a call site: macro name, `(`, ID wrapper name, `(`
static HEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*\(\s*(?:id|Id|ID|iD)\s*\(", MACRO_NAME))
        .expect("Invalid call-site head regex pattern")
});

/// Full call site up to the closing quote of the format string
static SITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"{}\s*\(\s*(?P<wrap>(?P<wname>id|Id|ID|iD)\s*\(\s*(?P<num>[^()]*?)\s*\))\s*,\s*"(?P<fmt>(?:[^"\\\n]|\\.)*)""#,
        MACRO_NAME
    ))
    .expect("Invalid call-site regex pattern")
});

/// One recognized trice macro invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Macro type token exactly as written
    pub macro_type: String,
    /// Decoded macro type
    pub info: MacroType,
    /// ID wrapper spelling
    pub wrapper: IdWrapper,
    /// Embedded ID, [`TriceId::SENTINEL`] when unassigned
    pub id: TriceId,
    /// Format string as written between the quotes
    pub format_string: String,
    /// 1-based line of the macro name
    pub line: usize,
    /// Byte span of `IDWRAPPER( n )` in the source text
    pub wrapper_span: Range<usize>,
}

impl CallSite {
    /// The `(macroType, formatString)` identity of this site
    pub fn fmt(&self) -> TriceFmt {
        TriceFmt::new(self.macro_type.clone(), self.format_string.clone())
    }

    /// Stamp width selected by wrapper and casing
    pub fn stamp(&self) -> StampWidth {
        self.wrapper.stamp_width(self.info.case)
    }

    /// Replacement text for the wrapper span carrying `id`
    pub fn wrapper_text(&self, id: TriceId) -> String {
        format!("{}({})", self.wrapper.spelling(), id)
    }
}

/// Result of parsing one source text
#[derive(Debug, Default)]
pub struct ParsedSource {
    /// Recognized call sites in text order
    pub sites: Vec<CallSite>,
    /// Malformed call sites, already skipped
    pub errors: Vec<TriceError>,
}

/// Call-site recognizer bound to an ID range
#[derive(Debug, Clone, Copy)]
pub struct MacroParser {
    range: IdRange,
}

impl MacroParser {
    /// Create a parser accepting embedded IDs inside `range`
    pub fn new(range: IdRange) -> Self {
        Self { range }
    }

    /// Parse all call sites of `text`; `origin` names the file in reports
    pub fn parse(&self, text: &str, origin: &str) -> ParsedSource {
        let lines = LineIndex::new(text);
        let mut parsed = ParsedSource::default();

        for head in HEAD_RE.find_iter(text) {
            let line = lines.line_of(head.start());
            let location = format!("{}:{}", origin, line);

            let caps = match SITE_RE.captures_at(text, head.start()) {
                Some(caps) if caps.get(0).map(|m| m.start()) == Some(head.start()) => caps,
                _ => {
                    parsed.errors.push(TriceError::Parse {
                        location,
                        message: format!("malformed call site `{}`", head.as_str()),
                    });
                    continue;
                }
            };

            let macro_type = caps["mt"].to_string();
            let Some(info) = MacroType::parse(&macro_type) else {
                parsed.errors.push(TriceError::Parse {
                    location,
                    message: format!("unknown macro type `{}`", macro_type),
                });
                continue;
            };
            let Some(wrapper) = IdWrapper::from_spelling(&caps["wname"]) else {
                continue;
            };

            let number = &caps["num"];
            let id = match self.parse_id(number) {
                Ok(id) => id,
                Err(message) => {
                    parsed.errors.push(TriceError::Parse { location, message });
                    continue;
                }
            };

            let Some(wrap) = caps.name("wrap") else {
                continue;
            };
            parsed.sites.push(CallSite {
                macro_type,
                info,
                wrapper,
                id,
                format_string: caps["fmt"].to_string(),
                line,
                wrapper_span: wrap.range(),
            });
        }

        parsed
    }

    fn parse_id(&self, number: &str) -> std::result::Result<TriceId, String> {
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("ID `{}` is not a decimal number", number));
        }
        let value: u32 = number
            .parse()
            .map_err(|_| format!("ID `{}` does not fit 32 bits", number))?;
        let id = TriceId(value);
        if !id.is_sentinel() && !self.range.contains(id) {
            return Err(format!("ID {} outside of {}", id, self.range));
        }
        Ok(id)
    }
}

/// Apply `(span, replacement)` edits to `text`. Spans must not overlap.
pub fn apply_edits(text: &str, edits: &[(Range<usize>, String)]) -> String {
    let mut sorted: Vec<&(Range<usize>, String)> = edits.iter().collect();
    sorted.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(text.len() + edits.len() * 8);
    let mut cursor = 0;
    for (span, replacement) in sorted {
        out.push_str(&text[cursor..span.start]);
        out.push_str(replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Byte offset → line number lookup
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}
