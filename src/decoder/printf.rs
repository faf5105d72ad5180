//! printf-style format string lexer
//!
//! Splits a format string into literal text and conversion specifiers. The
//! lexer understands the C flag characters, field width, precision and the
//! C length modifiers (which carry no information here because the wire
//! width comes from the macro type).

/// Flag characters of a conversion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    /// `-`
    pub left: bool,
    /// `+`
    pub plus: bool,
    /// ` `
    pub space: bool,
    /// `0`
    pub zero: bool,
    /// `#`
    pub alternate: bool,
}

/// One `%...` conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub flags: Flags,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub verb: char,
}

impl ConvSpec {
    /// Whether the conversion consumes a parameter
    pub fn consumes_value(&self) -> bool {
        self.verb != '%'
    }

    /// Whether the conversion expects a string parameter
    pub fn is_string(&self) -> bool {
        self.verb == 's'
    }

    /// Whether the conversion expects a floating point parameter
    pub fn is_float(&self) -> bool {
        matches!(self.verb, 'e' | 'E' | 'f' | 'F' | 'g' | 'G')
    }
}

/// A lexed piece of a format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece<'a> {
    Literal(&'a str),
    Spec(ConvSpec),
    /// A `%` not followed by a valid conversion, kept verbatim
    Invalid(&'a str),
}

/// Verbs the renderer understands
pub const VERBS: &str = "diuxXoObcqtpeEfFgGs%";

const LENGTH_MODIFIERS: &str = "hlzjL";
const INTEGER_VERBS: &str = "diuxXoOb";

/// Lex `format` into pieces
pub fn lex(format: &str) -> Vec<Piece<'_>> {
    let bytes = format.as_bytes();
    let mut pieces = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        if literal_start < i {
            pieces.push(Piece::Literal(&format[literal_start..i]));
        }
        let start = i;
        i += 1;

        let mut flags = Flags::default();
        while i < bytes.len() {
            match bytes[i] {
                b'-' => flags.left = true,
                b'+' => flags.plus = true,
                b' ' => flags.space = true,
                b'0' => flags.zero = true,
                b'#' => flags.alternate = true,
                _ => break,
            }
            i += 1;
        }

        let width = digits(bytes, &mut i);
        let precision = if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            Some(digits(bytes, &mut i).unwrap_or(0))
        } else {
            None
        };

        while i < bytes.len() {
            let c = bytes[i] as char;
            let is_modifier = LENGTH_MODIFIERS.contains(c)
                || (c == 't'
                    && bytes
                        .get(i + 1)
                        .is_some_and(|n| INTEGER_VERBS.contains(*n as char)));
            if !is_modifier {
                break;
            }
            i += 1;
        }

        match format[i..].chars().next() {
            Some(verb) if VERBS.contains(verb) => {
                i += verb.len_utf8();
                pieces.push(Piece::Spec(ConvSpec {
                    flags,
                    width,
                    precision,
                    verb,
                }));
            }
            Some(other) => {
                i += other.len_utf8();
                pieces.push(Piece::Invalid(&format[start..i]));
            }
            None => pieces.push(Piece::Invalid(&format[start..])),
        }
        literal_start = i;
    }

    if literal_start < bytes.len() {
        pieces.push(Piece::Literal(&format[literal_start..]));
    }
    pieces
}

fn digits(bytes: &[u8], i: &mut usize) -> Option<usize> {
    let start = *i;
    while *i < bytes.len() && bytes[*i].is_ascii_digit() {
        *i += 1;
    }
    if *i == start {
        return None;
    }
    std::str::from_utf8(&bytes[start..*i]).ok()?.parse().ok()
}

/// Conversions of `format` that consume a parameter, in order
pub fn value_specs(format: &str) -> Vec<ConvSpec> {
    lex(format)
        .into_iter()
        .filter_map(|p| match p {
            Piece::Spec(spec) if spec.consumes_value() => Some(spec),
            _ => None,
        })
        .collect()
}
