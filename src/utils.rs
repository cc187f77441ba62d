use crate::error::{Result, XdfError};

/// Non-localized integer parsing (avoids locale-dependent behavior).
pub fn atoi_nonlocalized(s: &str) -> i32 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    s.parse().unwrap_or(0)
}

/// Non-localized float parsing.
pub fn atof_nonlocalized(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    s.parse().unwrap_or(0.0)
}

/// Reads a fixed-width ASCII header field as a trimmed string. Fields
/// are space-padded in the EDF family and may be NUL-padded in GDF.
pub fn ascii_field(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string()
}

/// Writes `s` left-justified and space-padded into a fixed-width field,
/// truncating if it does not fit.
pub fn put_ascii(buf: &mut [u8], s: &str) {
    for b in buf.iter_mut() {
        *b = b' ';
    }
    let bytes = s.as_bytes();
    let len = bytes.len().min(buf.len());
    buf[..len].copy_from_slice(&bytes[..len]);
}

/// Formats a float so that it fits an 8-character ASCII header field.
///
/// EDF stores physical limits as 8-byte ASCII; a shortest representation
/// is preferred, precision is reduced only when the value does not fit.
pub fn fmt_float8(v: f64) -> String {
    let s = format!("{}", v);
    if s.len() <= 8 {
        return s;
    }
    for precision in (0..=6).rev() {
        let s = format!("{:.*}", precision, v);
        if s.len() <= 8 {
            return s;
        }
    }
    // magnitude too large for a plain decimal, fall back to exponent form
    format!("{:.1e}", v)
}

/// Parses an EDF duration string into 100-nanosecond units.
pub fn parse_edf_time(s: &str) -> Result<i64> {
    let s = s.trim();

    if s.is_empty() {
        return Err(XdfError::InvalidFormat("Empty time string".to_string()));
    }

    let (negative, s) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let mut value = 0i64;

    if let Some(dot_pos) = s.find('.') {
        let integer_part = &s[..dot_pos];
        let decimal_part = &s[dot_pos + 1..];

        if !integer_part.is_empty() {
            value += integer_part
                .parse::<i64>()
                .map_err(|_| XdfError::InvalidFormat("Invalid integer part".to_string()))?
                * crate::TIME_DIMENSION;
        }

        // At most 7 decimal digits carry precision at this resolution.
        if !decimal_part.is_empty() {
            let decimal_str = if decimal_part.len() > 7 {
                &decimal_part[..7]
            } else {
                decimal_part
            };

            let decimal_value = decimal_str
                .parse::<i64>()
                .map_err(|_| XdfError::InvalidFormat("Invalid decimal part".to_string()))?;

            let scale = 10i64.pow(7 - decimal_str.len() as u32);
            value += decimal_value * scale;
        }
    } else {
        value = s
            .parse::<i64>()
            .map_err(|_| XdfError::InvalidFormat("Invalid integer".to_string()))?
            * crate::TIME_DIMENSION;
    }

    if negative {
        value = -value;
    }

    Ok(value)
}
