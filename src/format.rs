//! Value formatting for the refresh loop
//!
//! Read values are rendered through a [`Format`] before being pushed to the
//! view. printf-style strings are handled here; script formats delegate to
//! the Rhai engine in [`crate::scripting`].

use crate::error::{FrameworkError, Result};
use crate::scripting::ScriptEngine;
use crate::types::{Format, Value};
use std::iter::Peekable;
use std::str::Chars;

/// Largest accepted field width or precision
const MAX_FIELD: usize = 256;

/// 2^64, the first magnitude a hex conversion cannot represent
const HEX_LIMIT: f64 = 18_446_744_073_709_551_616.0;

/// A parsed printf conversion such as `%-8.3f`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Conversion {
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    space_sign: bool,
    width: usize,
    precision: Option<usize>,
    kind: char,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Conversion(Conversion),
}

fn parse(spec: &str) -> Result<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = spec.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            literal.push('%');
            continue;
        }

        let mut conv = Conversion {
            left_align: false,
            zero_pad: false,
            plus_sign: false,
            space_sign: false,
            width: 0,
            precision: None,
            kind: 'f',
        };

        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => conv.left_align = true,
                '0' => conv.zero_pad = true,
                '+' => conv.plus_sign = true,
                ' ' => conv.space_sign = true,
                _ => break,
            }
            chars.next();
        }

        conv.width = field(&mut chars, spec, "width")?;

        if chars.peek() == Some(&'.') {
            chars.next();
            conv.precision = Some(field(&mut chars, spec, "precision")?);
        }

        match chars.next() {
            Some(kind @ ('f' | 'F' | 'e' | 'E' | 'd' | 'i' | 'u' | 'x' | 'X' | 's')) => {
                conv.kind = kind;
            }
            Some(other) => {
                return Err(FrameworkError::Refresh(format!(
                    "unsupported conversion '%{}' in format '{}'",
                    other, spec
                )))
            }
            None => {
                return Err(FrameworkError::Refresh(format!(
                    "incomplete conversion at end of format '{}'",
                    spec
                )))
            }
        }

        if !literal.is_empty() {
            pieces.push(Piece::Literal(std::mem::take(&mut literal)));
        }
        pieces.push(Piece::Conversion(conv));
    }

    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }

    let conversions = pieces
        .iter()
        .filter(|p| matches!(p, Piece::Conversion(_)))
        .count();
    if conversions > 1 {
        return Err(FrameworkError::Refresh(format!(
            "format '{}' has {} conversions, expected at most one",
            spec, conversions
        )));
    }

    Ok(pieces)
}

fn field(chars: &mut Peekable<Chars<'_>>, spec: &str, what: &str) -> Result<usize> {
    let mut n = 0usize;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(d as usize))
            .filter(|n| *n <= MAX_FIELD)
            .ok_or_else(|| {
                FrameworkError::Refresh(format!(
                    "{} exceeds {} in format '{}'",
                    what, MAX_FIELD, spec
                ))
            })?;
        chars.next();
    }
    Ok(n)
}

/// Check that a printf format string is usable for a single value
pub fn validate_printf(spec: &str) -> Result<()> {
    parse(spec).map(|_| ())
}

/// Format a single value with a printf-style format string
pub fn sprintf(spec: &str, value: &Value) -> Result<String> {
    let mut out = String::new();
    for piece in parse(spec)? {
        match piece {
            Piece::Literal(text) => out.push_str(&text),
            Piece::Conversion(conv) => out.push_str(&apply(&conv, value, spec)?),
        }
    }
    Ok(out)
}

fn numeric(value: &Value, spec: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        FrameworkError::Refresh(format!("cannot format '{}' with '{}'", value, spec))
    })
}

fn apply(conv: &Conversion, value: &Value, spec: &str) -> Result<String> {
    if conv.kind == 's' {
        let mut text = value.to_string();
        if let Some(p) = conv.precision {
            text = text.chars().take(p).collect();
        }
        return Ok(pad(conv, String::new(), text, false));
    }

    let n = numeric(value, spec)?;
    let magnitude = n.abs();
    let integral = matches!(conv.kind, 'd' | 'i' | 'u' | 'x' | 'X');
    if integral && !n.is_finite() {
        return Err(FrameworkError::Refresh(format!(
            "cannot format {} as an integer with '{}'",
            n, spec
        )));
    }
    if matches!(conv.kind, 'x' | 'X') && magnitude.trunc() >= HEX_LIMIT {
        return Err(FrameworkError::Refresh(format!(
            "{} is too large for '{}'",
            n, spec
        )));
    }
    let negative = n < 0.0 && !(integral && magnitude.trunc() == 0.0);

    let body = match conv.kind {
        'f' | 'F' => format!("{:.*}", conv.precision.unwrap_or(6), magnitude),
        'e' | 'E' => {
            let s = exponent(magnitude, conv.precision.unwrap_or(6));
            if conv.kind == 'E' {
                s.to_uppercase()
            } else {
                s
            }
        }
        'd' | 'i' | 'u' => format!("{:.0}", magnitude.trunc()),
        'x' => format!("{:x}", magnitude.trunc() as u64),
        'X' => format!("{:X}", magnitude.trunc() as u64),
        other => {
            return Err(FrameworkError::Refresh(format!(
                "unsupported conversion '%{}' in format '{}'",
                other, spec
            )))
        }
    };

    let sign = if negative {
        "-"
    } else if conv.plus_sign {
        "+"
    } else if conv.space_sign {
        " "
    } else {
        ""
    };

    Ok(pad(conv, sign.to_string(), body, true))
}

/// C-style scientific notation: mantissa, `e`, signed two-digit exponent
fn exponent(magnitude: f64, precision: usize) -> String {
    let rust = format!("{:.*e}", precision, magnitude);
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => rust,
    }
}

fn pad(conv: &Conversion, sign: String, body: String, numeric: bool) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= conv.width {
        return sign + body.as_str();
    }
    let fill = conv.width - len;
    if conv.left_align {
        format!("{}{}{}", sign, body, " ".repeat(fill))
    } else if conv.zero_pad && numeric {
        format!("{}{}{}", sign, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, body)
    }
}

/// Render a value through a binding's format
pub fn render(format: &Format, value: &Value, scripts: &ScriptEngine) -> Result<String> {
    match format {
        Format::Printf(spec) => sprintf(spec, value),
        Format::Custom(f) => f(value).map_err(FrameworkError::into_refresh),
        Format::Script(source) => scripts.format(source, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(v: f64) -> Value {
        Value::Number(v)
    }

    #[test]
    fn test_default_format() {
        assert_eq!(sprintf("%.4f", &n(1.5)).unwrap(), "1.5000");
        assert_eq!(sprintf("%.4f", &n(-2.25)).unwrap(), "-2.2500");
    }

    #[test]
    fn test_literals_and_percent() {
        assert_eq!(sprintf("%.1f V", &n(3.33)).unwrap(), "3.3 V");
        assert_eq!(sprintf("%d%%", &n(75.9)).unwrap(), "75%");
        assert_eq!(sprintf("no conversions", &n(1.0)).unwrap(), "no conversions");
    }

    #[test]
    fn test_integer_and_hex() {
        assert_eq!(sprintf("%d", &n(-12.7)).unwrap(), "-12");
        assert_eq!(sprintf("0x%04X", &n(255.0)).unwrap(), "0x00FF");
        assert_eq!(sprintf("%x", &n(3054.0)).unwrap(), "bee");
    }

    #[test]
    fn test_width_and_flags() {
        assert_eq!(sprintf("%8.2f", &n(3.14159)).unwrap(), "    3.14");
        assert_eq!(sprintf("%-6d|", &n(42.0)).unwrap(), "42    |");
        assert_eq!(sprintf("%+.1f", &n(2.0)).unwrap(), "+2.0");
        assert_eq!(sprintf("%06.1f", &n(-2.5)).unwrap(), "-002.5");
    }

    #[test]
    fn test_exponent() {
        assert_eq!(sprintf("%.2e", &n(12345.0)).unwrap(), "1.23e+04");
        assert_eq!(sprintf("%.1E", &n(0.00042)).unwrap(), "4.2E-04");
    }

    #[test]
    fn test_string_conversion() {
        assert_eq!(sprintf("%s", &Value::from("T7-Pro")).unwrap(), "T7-Pro");
        assert_eq!(sprintf("%.2s", &Value::from("T7-Pro")).unwrap(), "T7");
    }

    #[test]
    fn test_numeric_conversion_of_text_fails() {
        let err = sprintf("%.4f", &Value::from("abc")).unwrap_err();
        assert!(matches!(err, FrameworkError::Refresh(_)));
        assert_eq!(sprintf("%.1f", &Value::from("2.26")).unwrap(), "2.3");
    }

    #[test]
    fn test_invalid_specs() {
        assert!(validate_printf("%.4f").is_ok());
        assert!(validate_printf("%q").is_err());
        assert!(validate_printf("%.4").is_err());
        assert!(validate_printf("%f and %f").is_err());
    }

    #[test]
    fn test_oversized_fields_rejected() {
        let err = sprintf("%99999999999999999999d", &n(1.0)).unwrap_err();
        assert!(matches!(err, FrameworkError::Refresh(_)));
        assert!(validate_printf("%.999999999f").is_err());
        assert!(validate_printf("%257d").is_err());
        assert_eq!(sprintf("%.12f", &n(0.5)).unwrap(), "0.500000000000");
    }

    #[test]
    fn test_integer_conversion_of_extreme_values() {
        assert_eq!(sprintf("%d", &n(1e30)).unwrap(), "1000000000000000019884624838656");
        assert_eq!(sprintf("%d", &n(-1e20)).unwrap(), "-100000000000000000000");
        assert!(sprintf("%d", &n(f64::NAN)).is_err());
        assert!(sprintf("%i", &n(f64::INFINITY)).is_err());
        assert!(sprintf("%u", &n(f64::NEG_INFINITY)).is_err());
        assert!(sprintf("%x", &n(1e30)).is_err());
        assert_eq!(sprintf("%X", &n(18446744073709549568.0)).unwrap(), "FFFFFFFFFFFFF800");
    }

    #[test]
    fn test_render_custom() {
        let scripts = ScriptEngine::new();
        let fmt = Format::custom(|v| Ok(format!("<{}>", v)));
        assert_eq!(render(&fmt, &n(1.0), &scripts).unwrap(), "<1>");

        let failing = Format::custom(|_| Err(FrameworkError::Load("bad".into())));
        let err = render(&failing, &n(1.0), &scripts).unwrap_err();
        assert!(matches!(err, FrameworkError::Refresh(_)));
    }
}
