//! Fixed-point value parser for the `-?D{1,2}.D` record format.
//!
//! Values are decoded with integer arithmetic into tenths, so `-12.3`
//! becomes `-123`. Everything that does not match the layout exactly is
//! reported as [`ProcessorError::MalformedValue`] instead of being misread.

use crate::processor::ProcessorError;

const SHAPE: &str = "expected an optional '-', one or two digits, '.', one digit";

/// Parses a value into integer tenths.
pub fn parse_tenths(bytes: &[u8]) -> Result<i64, ProcessorError> {
    let (negative, digits) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, bytes),
        None => return Err(ProcessorError::malformed(bytes, "empty value")),
    };

    let digit = |b: u8| -> Result<i64, ProcessorError> {
        if b.is_ascii_digit() {
            Ok((b - b'0') as i64)
        } else {
            Err(ProcessorError::malformed(bytes, "non-digit byte"))
        }
    };

    let magnitude = match *digits {
        [ones, b'.', frac] => digit(ones)? * 10 + digit(frac)?,
        [tens, ones, b'.', frac] => digit(tens)? * 100 + digit(ones)? * 10 + digit(frac)?,
        _ => return Err(ProcessorError::malformed(bytes, SHAPE)),
    };

    Ok(if negative { -magnitude } else { magnitude })
}

/// Parses a value into a float, e.g. `b"-12.3"` into `-12.3`.
pub fn parse_fixed_point(bytes: &[u8]) -> Result<f64, ProcessorError> {
    parse_tenths(bytes).map(tenths_to_f64)
}

#[inline]
pub fn tenths_to_f64(tenths: i64) -> f64 {
    tenths as f64 / 10.0
}
