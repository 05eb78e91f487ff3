use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Opaque reference into the host's object table.
pub type ObjectHandle = u32;

/// The handle that never names an object.
pub const NULL_HANDLE: ObjectHandle = 0;

/// Two numbers closer than this compare equal.
pub const NUMBER_EPSILON: f32 = 1e-5;

/// Runtime value in the Cinder language.
///
/// Every temporary, stack slot and heap cell holds one of these. Reading a
/// value through one of the `as_*` accessors never fails: each tag has a
/// defined coercion to every other representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,

    Bool(bool),

    /// 32-bit float; the language has no separate integer type.
    Number(f32),

    /// Owned UTF-8 text. Cloning a value duplicates the buffer.
    Text(String),

    /// Non-owning handle, lifetime managed by the object graph.
    Object(ObjectHandle),
}

/// The tag of a [`Value`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    Text,
    Object,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(_) => ValueKind::Number,
            Value::Text(_) => ValueKind::Text,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Name of the tag as seen by scripts.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Object(_) => "object",
        }
    }

    // Setters. Assigning a new variant drops the previous payload.

    pub fn set_null(&mut self) {
        *self = Value::Null;
    }

    pub fn set_bool(&mut self, b: bool) {
        *self = Value::Bool(b);
    }

    pub fn set_number(&mut self, n: f32) {
        *self = Value::Number(n);
    }

    pub fn set_text(&mut self, s: &str) {
        *self = Value::Text(s.to_string());
    }

    pub fn set_handle(&mut self, handle: ObjectHandle) {
        *self = Value::Object(handle);
    }

    /// Deep-copies `self` into `dst`, reusing `dst`'s text buffer when it can.
    pub fn copy_into(&self, dst: &mut Value) {
        dst.clone_from(self);
    }

    // Readers

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Null => false,
            Value::Object(_) => true,
        }
    }

    pub fn as_number(&self) -> f32 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Text(s) => parse_number_prefix(s),
            Value::Null => 0.0,
            Value::Object(_) => 0.0,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Bool(b) => String::from(if *b { "true" } else { "false" }),
            Value::Null => "null".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Object(h) => format!("[object @ 0x{:x}]", h),
        }
    }

    pub fn as_handle(&self) -> ObjectHandle {
        match self {
            Value::Object(h) => *h,
            _ => NULL_HANDLE,
        }
    }

    /// Three-way comparison used by the `cmp` instruction.
    ///
    /// Values of the same tag compare naturally (numbers within
    /// [`NUMBER_EPSILON`] are equal, text compares byte-wise). Mixed tags are
    /// resolved in a fixed order: null sorts below everything, then text
    /// wins (the other side is turned into text), then numbers, then
    /// booleans. So `"10" < "9"` but `10 > 9`, and `"10"` against `9`
    /// compares as text.
    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;

        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Number(a), Number(b)) => compare_numbers(*a, *b),
            (Text(a), Text(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Object(a), Object(b)) => a.cmp(b),

            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,

            (Text(a), b) => a.as_bytes().cmp(b.as_text().as_bytes()),
            (a, Text(b)) => a.as_text().as_bytes().cmp(b.as_bytes()),

            (Number(_), _) | (_, Number(_)) => {
                compare_numbers(self.as_number(), other.as_number())
            }

            (Bool(_), _) | (_, Bool(_)) => self.as_bool().cmp(&other.as_bool()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.as_text()),
        }
    }
}

fn compare_numbers(a: f32, b: f32) -> Ordering {
    if (a - b).abs() >= NUMBER_EPSILON {
        if a > b {
            Ordering::Greater
        } else {
            Ordering::Less
        }
    } else {
        Ordering::Equal
    }
}

/// Integral numbers (and anything beyond the i64 range) print without a
/// fractional part; the rest print with six decimals.
fn format_number(n: f32) -> String {
    if n.fract() == 0.0 || n <= i64::MIN as f32 || n >= i64::MAX as f32 {
        format!("{}", n as i64)
    } else {
        format!("{:.6}", n)
    }
}

/// Parses the longest numeric prefix of `s`, after leading whitespace, the
/// way C's `atof` does: decimal with an optional exponent, `0x` hex with an
/// optional binary `p` exponent, `inf`/`infinity` and `nan`. Returns 0.0
/// when there is none.
fn parse_number_prefix(s: &str) -> f32 {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let magnitude = parse_special(rest)
        .or_else(|| parse_hex(rest.as_bytes()))
        .unwrap_or_else(|| parse_decimal(rest.as_bytes()));

    if negative { -magnitude } else { magnitude }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn parse_special(s: &str) -> Option<f32> {
    if starts_with_ignore_case(s, "inf") {
        Some(f32::INFINITY)
    } else if starts_with_ignore_case(s, "nan") {
        Some(f32::NAN)
    } else {
        None
    }
}

/// Consumes a run of ASCII digits (decimal, or hex when `radix` is 16)
/// starting at `i` and returns the index after it.
fn skip_digits(bytes: &[u8], mut i: usize, radix: u32) -> usize {
    while i < bytes.len() && (bytes[i] as char).is_digit(radix) {
        i += 1;
    }
    i
}

/// Parses a signed decimal exponent at `i`, if at least one digit follows
/// the optional sign.
fn parse_exponent(bytes: &[u8], i: usize) -> Option<i32> {
    let mut j = i;
    if j < bytes.len() && (bytes[j] == b'-' || bytes[j] == b'+') {
        j += 1;
    }
    let end = skip_digits(bytes, j, 10);
    if end == j {
        return None;
    }
    let digits = std::str::from_utf8(&bytes[i..end]).ok()?;
    // saturate absurd exponents; the result is 0 or infinite either way
    Some(digits.parse::<i32>().unwrap_or(if bytes[i] == b'-' {
        i32::MIN
    } else {
        i32::MAX
    }))
}

fn parse_hex(bytes: &[u8]) -> Option<f32> {
    if bytes.len() < 2 || bytes[0] != b'0' || !matches!(bytes[1], b'x' | b'X') {
        return None;
    }

    let mut mantissa = 0f64;
    let mut scale = 0i32;
    let mut digits = 0;
    let mut i = 2;

    while let Some(d) = bytes.get(i).and_then(|&b| (b as char).to_digit(16)) {
        mantissa = mantissa * 16.0 + d as f64;
        digits += 1;
        i += 1;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        while let Some(d) = bytes.get(i).and_then(|&b| (b as char).to_digit(16)) {
            mantissa = mantissa * 16.0 + d as f64;
            scale -= 4;
            digits += 1;
            i += 1;
        }
    }

    // "0x" alone reads as the "0" before it
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(i), Some(b'p' | b'P')) {
        if let Some(exp) = parse_exponent(bytes, i + 1) {
            scale = scale.saturating_add(exp);
        }
    }

    Some((mantissa * 2f64.powi(scale)) as f32)
}

fn parse_decimal(bytes: &[u8]) -> f32 {
    let int_end = skip_digits(bytes, 0, 10);
    let mut end = int_end;
    let mut has_digits = int_end > 0;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = skip_digits(bytes, end + 1, 10);
        has_digits |= frac_end > end + 1;
        end = frac_end;
    }

    if !has_digits {
        return 0.0;
    }

    // exponent only counts when at least one digit follows it
    if matches!(bytes.get(end), Some(b'e' | b'E')) && parse_exponent(bytes, end + 1).is_some() {
        let exp_digits = if matches!(bytes.get(end + 1), Some(b'-' | b'+')) {
            end + 2
        } else {
            end + 1
        };
        end = skip_digits(bytes, exp_digits, 10);
    }

    let mut literal = String::with_capacity(end + 2);
    if int_end == 0 {
        literal.push('0');
    }
    literal.push_str(std::str::from_utf8(&bytes[..end]).unwrap_or("0"));

    literal.parse::<f32>().unwrap_or(0.0)
}
