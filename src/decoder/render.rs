//! Format renderer
//!
//! Substitutes the parameters of a [`TraceRecord`](crate::decoder::TraceRecord)
//! into its registered format string with printf semantics.
//!
//! # Conversions
//!
//! | Verb            | Parameter                     | Output                        |
//! |-----------------|-------------------------------|-------------------------------|
//! | `d` `i`         | integer, sign-extended        | signed decimal                |
//! | `u`             | integer, raw bit pattern      | unsigned decimal              |
//! | `x` `X` `o` `b` | integer, raw bit pattern      | hex / octal / binary          |
//! | `O`             | integer, raw bit pattern      | octal with `0o` prefix        |
//! | `c` `q`         | integer                       | character, quoted character   |
//! | `t`             | integer                       | `true` / `false`              |
//! | `p`             | integer                       | `0x` + hex                    |
//! | `e` `f` `g`     | 32- or 64-bit IEEE value      | scientific / fixed / shortest |
//! | `s`             | length-prefixed string        | verbatim                      |
//!
//! A 32-bit float is widened only after it was reconstructed as `f32`, so
//! the output shows exactly the precision the device had.
//!
//! Parameters that do not fit their conversion render as
//! `%!verb(kind=value)`, missing ones as `%!verb(MISSING)` and surplus ones
//! are summarised as `%!(EXTRA n)`.

use crate::decoder::printf::{lex, value_specs, ConvSpec, Piece};
use crate::decoder::wire::{Endianness, ParamLayout, Slot};
use crate::types::TriceFmt;

/// A parameter extracted from record bytes
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Integer slot: width in bits and zero-extended bit pattern
    Int { bits: u32, raw: u64 },
    /// String slot
    Str(Vec<u8>),
}

impl Arg {
    fn signed(bits: u32, raw: u64) -> i64 {
        if bits >= 64 {
            raw as i64
        } else {
            let shift = 64 - bits;
            ((raw << shift) as i64) >> shift
        }
    }

    fn kind(&self) -> String {
        match self {
            Arg::Int { bits, raw } => format!("int{}={}", bits, Self::signed(*bits, *raw)),
            Arg::Str(bytes) => format!("string={}", String::from_utf8_lossy(bytes)),
        }
    }
}

/// Split host-order parameter bytes into arguments. Stops early when the
/// bytes run out.
pub fn extract_args(layout: &ParamLayout, params: &[u8]) -> Vec<Arg> {
    let mut args = Vec::with_capacity(layout.len());
    let mut pos = 0;
    for slot in layout.slots() {
        match slot {
            Slot::Value(width) => {
                let n = width.bytes();
                let Some(bytes) = params.get(pos..pos + n) else {
                    break;
                };
                args.push(Arg::Int {
                    bits: width.bits(),
                    raw: Endianness::NATIVE.read_uint(bytes),
                });
                pos += n;
            }
            Slot::Str => {
                let Some(len) = params.get(pos..pos + 2) else {
                    break;
                };
                let len = Endianness::NATIVE.read_uint(len) as usize;
                let Some(bytes) = params.get(pos + 2..pos + 2 + len) else {
                    break;
                };
                args.push(Arg::Str(bytes.to_vec()));
                pos += 2 + len;
            }
        }
    }
    args
}

/// Rendered text plus any inconsistency found on the way
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderOutcome {
    pub text: String,
    /// Description of a parameter count mismatch
    pub mismatch: Option<String>,
}

/// printf-style renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatRenderer;

impl FormatRenderer {
    /// Create a renderer
    pub fn new() -> Self {
        Self
    }

    /// Render `params` (host order, laid out per `layout`) into `fmt`
    pub fn render(&self, fmt: &TriceFmt, layout: &ParamLayout, params: &[u8]) -> RenderOutcome {
        let args = extract_args(layout, params);
        let outcome = self.render_args(&fmt.format_string, &args);

        let conversions = value_specs(&fmt.format_string).len();
        let mismatch = if layout.len() != conversions {
            Some(format!(
                "{} carries {} values but its format has {} conversions",
                fmt.macro_type,
                layout.len(),
                conversions
            ))
        } else if args.len() < layout.len() {
            Some(format!(
                "{} expects {} values, record holds {}",
                fmt.macro_type,
                layout.len(),
                args.len()
            ))
        } else {
            outcome.mismatch
        };

        RenderOutcome {
            text: outcome.text,
            mismatch,
        }
    }

    /// Render already extracted arguments into `format`
    pub fn render_args(&self, format: &str, args: &[Arg]) -> RenderOutcome {
        let mut text = String::with_capacity(format.len() + args.len() * 4);
        let mut next = args.iter();
        let mut missing = 0;

        for piece in lex(format) {
            match piece {
                Piece::Literal(s) | Piece::Invalid(s) => text.push_str(s),
                Piece::Spec(spec) if !spec.consumes_value() => text.push('%'),
                Piece::Spec(spec) => match next.next() {
                    Some(arg) => text.push_str(&format_arg(&spec, arg)),
                    None => {
                        missing += 1;
                        text.push_str(&format!("%!{}(MISSING)", spec.verb));
                    }
                },
            }
        }

        let extra = next.count();
        if extra > 0 {
            text.push_str(&format!("%!(EXTRA {})", extra));
        }

        let mismatch = match (missing, extra) {
            (0, 0) => None,
            (m, 0) => Some(format!("{} parameters missing", m)),
            (_, e) => Some(format!("{} parameters unused", e)),
        };
        RenderOutcome { text, mismatch }
    }
}

// ==================== Conversions ====================

fn bad_verb(spec: &ConvSpec, arg: &Arg) -> String {
    format!("%!{}({})", spec.verb, arg.kind())
}

fn format_arg(spec: &ConvSpec, arg: &Arg) -> String {
    match arg {
        Arg::Int { bits, raw } => format_int(spec, *bits, *raw).unwrap_or_else(|| bad_verb(spec, arg)),
        Arg::Str(bytes) => format_str(spec, bytes).unwrap_or_else(|| bad_verb(spec, arg)),
    }
}

fn format_int(spec: &ConvSpec, bits: u32, raw: u64) -> Option<String> {
    let signed = Arg::signed(bits, raw);
    let alt = spec.flags.alternate;
    let out = match spec.verb {
        'd' | 'i' => pad_number(spec, signed < 0, "", signed.unsigned_abs().to_string(), true),
        'u' => pad_number(spec, false, "", raw.to_string(), true),
        'x' => pad_number(spec, false, if alt { "0x" } else { "" }, format!("{:x}", raw), true),
        'X' => pad_number(spec, false, if alt { "0X" } else { "" }, format!("{:X}", raw), true),
        'o' => pad_number(spec, false, if alt { "0" } else { "" }, format!("{:o}", raw), true),
        'O' => pad_number(spec, false, "0o", format!("{:o}", raw), true),
        'b' => pad_number(spec, false, if alt { "0b" } else { "" }, format!("{:b}", raw), true),
        'p' => pad_number(spec, false, "0x", format!("{:x}", raw), true),
        'c' => pad_text(spec, &to_char(raw).to_string()),
        'q' => pad_text(spec, &format!("{:?}", to_char(raw))),
        't' => pad_text(spec, if raw != 0 { "true" } else { "false" }),
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => match bits {
            32 => format_float(spec, f64::from(f32::from_bits(raw as u32)), true),
            64 => format_float(spec, f64::from_bits(raw), false),
            _ => return None,
        },
        _ => return None,
    };
    Some(out)
}

fn to_char(raw: u64) -> char {
    u32::try_from(raw)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn format_str(spec: &ConvSpec, bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let out = match spec.verb {
        's' => {
            let shown: String = match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text.into_owned(),
            };
            pad_text(spec, &shown)
        }
        'q' => pad_text(spec, &format!("{:?}", text)),
        'x' | 'X' => {
            let sep = if spec.flags.space { " " } else { "" };
            let hex: Vec<String> = bytes
                .iter()
                .map(|b| {
                    if spec.verb == 'x' {
                        format!("{:02x}", b)
                    } else {
                        format!("{:02X}", b)
                    }
                })
                .collect();
            pad_text(spec, &hex.join(sep))
        }
        _ => return None,
    };
    Some(out)
}

/// Apply width to plain text
fn pad_text(spec: &ConvSpec, text: &str) -> String {
    let len = text.chars().count();
    let width = spec.width.unwrap_or(0);
    if len >= width {
        return text.to_string();
    }
    let fill = " ".repeat(width - len);
    if spec.flags.left {
        format!("{}{}", text, fill)
    } else {
        format!("{}{}", fill, text)
    }
}

/// Assemble sign, prefix and digits and apply precision, width and flags
fn pad_number(spec: &ConvSpec, negative: bool, prefix: &str, digits: String, integer: bool) -> String {
    let digits = match spec.precision {
        Some(p) if integer && digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
        _ => digits,
    };
    let sign = if negative {
        "-"
    } else if spec.flags.plus {
        "+"
    } else if spec.flags.space {
        " "
    } else {
        ""
    };

    let len = sign.len() + prefix.len() + digits.len();
    let width = spec.width.unwrap_or(0);
    if len >= width {
        return format!("{}{}{}", sign, prefix, digits);
    }
    let fill = width - len;
    let zero_pad = spec.flags.zero && !spec.flags.left && !(integer && spec.precision.is_some());
    if spec.flags.left {
        format!("{}{}{}{}", sign, prefix, digits, " ".repeat(fill))
    } else if zero_pad {
        format!("{}{}{}{}", sign, prefix, "0".repeat(fill), digits)
    } else {
        format!("{}{}{}{}", " ".repeat(fill), sign, prefix, digits)
    }
}

// ==================== Floats ====================

fn format_float(spec: &ConvSpec, value: f64, single: bool) -> String {
    let upper = spec.verb.is_ascii_uppercase();
    if value.is_nan() {
        return pad_text(spec, "NaN");
    }
    if value.is_infinite() {
        let text = if value < 0.0 { "-Inf" } else if spec.flags.plus { "+Inf" } else { "Inf" };
        return pad_text(spec, text);
    }

    let negative = value.is_sign_negative() && value != 0.0;
    let abs = value.abs();
    let body = match spec.verb {
        'f' | 'F' => format!("{:.*}", spec.precision.unwrap_or(6), abs),
        'e' | 'E' => exponent_form(&format!("{:.*e}", spec.precision.unwrap_or(6), abs)),
        _ => general_form(abs, spec.precision, single),
    };
    let body = if upper { body.to_uppercase() } else { body };
    pad_number(spec, negative, "", body, false)
}

/// Rewrite Rust's `1.5e8` exponent into C's `1.5e+08`
fn exponent_form(rust: &str) -> String {
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.unsigned_abs())
        }
        None => rust.to_string(),
    }
}

fn decimal_exponent(scientific: &str) -> i32 {
    scientific
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0)
}

fn strip_fraction_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `%g`: shortest round-trip digits without precision, `p` significant digits with
fn general_form(abs: f64, precision: Option<usize>, single: bool) -> String {
    match precision {
        None => {
            let (scientific, plain) = if single {
                let v = abs as f32;
                (format!("{:e}", v), format!("{}", v))
            } else {
                (format!("{:e}", abs), format!("{}", abs))
            };
            let exp = decimal_exponent(&scientific);
            if exp < -4 || exp >= 6 {
                exponent_form(&scientific)
            } else {
                plain
            }
        }
        Some(p) => {
            let p = p.max(1);
            let scientific = format!("{:.*e}", p - 1, abs);
            let exp = decimal_exponent(&scientific);
            if exp < -4 || exp >= p as i32 {
                let (mantissa, _) = scientific.split_once('e').unwrap_or((&scientific, ""));
                exponent_form(&format!("{}e{}", strip_fraction_zeros(mantissa), exp))
            } else {
                let decimals = (p as i32 - 1 - exp).max(0) as usize;
                strip_fraction_zeros(&format!("{:.*}", decimals, abs))
            }
        }
    }
}
