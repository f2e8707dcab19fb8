//! Timestamp parsing shared by transcript markers and encoder timemarks.
//!
//! One tolerant parser handles every shape we see in the wild:
//! `SS`, `MM:SS`, `HH:MM:SS` and `HH:MM:SS.mmm`, optionally wrapped in
//! square brackets the way transcript markers are written (`[01:02:03]`).

/// Parse a marker or timemark into seconds.
///
/// # Examples
/// ```
/// use bclip_models::timestamp::parse_time_marker;
/// assert_eq!(parse_time_marker("[01:02:03]").unwrap(), 3723.0);
/// assert_eq!(parse_time_marker("05:30").unwrap(), 330.0);
/// assert_eq!(parse_time_marker("[45]").unwrap(), 45.0);
/// assert_eq!(parse_time_marker("00:00:20.500000").unwrap(), 20.5);
/// ```
pub fn parse_time_marker(text: &str) -> Result<f64, TimestampError> {
    let ts = strip_brackets(text.trim()).trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }
    if ts.starts_with('-') {
        return Err(TimestampError::Negative);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let last = parts.len() - 1;
    let mut values = [0.0f64; 3];

    if parts.len() > 3 {
        return Err(TimestampError::InvalidFormat(ts.to_string()));
    }

    for (i, part) in parts.iter().enumerate() {
        // Only the trailing seconds component may carry a fraction.
        values[i] = parse_component(part, i == last)
            .ok_or_else(|| TimestampError::InvalidValue(component_name(parts.len(), i), part.to_string()))?;
    }

    let seconds = match parts.len() {
        1 => values[0],
        2 => values[0] * 60.0 + values[1],
        _ => values[0] * 3600.0 + values[1] * 60.0 + values[2],
    };

    Ok(seconds)
}

fn strip_brackets(ts: &str) -> &str {
    ts.strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(ts)
}

/// Digits with an optional fractional part. Rejects signs, exponents and
/// words like `inf` that `f64::from_str` would otherwise accept.
fn parse_component(part: &str, allow_fraction: bool) -> Option<f64> {
    let (whole, frac) = match part.split_once('.') {
        Some((w, f)) if allow_fraction => (w, Some(f)),
        Some(_) => return None,
        None => (part, None),
    };

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(f) = frac {
        if f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    part.parse().ok()
}

fn component_name(len: usize, index: usize) -> &'static str {
    match (len, index) {
        (3, 0) => "hours",
        (3, 1) | (2, 0) => "minutes",
        _ => "seconds",
    }
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampError {
    /// Timestamp string is empty
    Empty,
    /// Timestamp contains negative values
    Negative,
    /// Invalid numeric value for a component
    InvalidValue(&'static str, String),
    /// Invalid timestamp format
    InvalidFormat(String),
}

impl std::fmt::Display for TimestampError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Timestamp cannot be empty"),
            Self::Negative => write!(f, "Timestamp cannot be negative"),
            Self::InvalidValue(component, value) => {
                write!(f, "Invalid {} value: {}", component, value)
            }
            Self::InvalidFormat(ts) => write!(
                f,
                "Invalid timestamp format '{}'. Use SS, MM:SS, HH:MM:SS or HH:MM:SS.mmm",
                ts
            ),
        }
    }
}

impl std::error::Error for TimestampError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracketed_markers() {
        assert_eq!(parse_time_marker("[01:02:03]").unwrap(), 3723.0);
        assert_eq!(parse_time_marker("[05:30]").unwrap(), 330.0);
        assert_eq!(parse_time_marker("[45]").unwrap(), 45.0);
    }

    #[test]
    fn test_plain_forms() {
        assert_eq!(parse_time_marker("00:00:00").unwrap(), 0.0);
        assert_eq!(parse_time_marker("01:30:45").unwrap(), 5445.0);
        assert_eq!(parse_time_marker("53:53").unwrap(), 3233.0);
        assert_eq!(parse_time_marker("125").unwrap(), 125.0);
    }

    #[test]
    fn test_encoder_timemarks() {
        assert!((parse_time_marker("00:00:05.000000").unwrap() - 5.0).abs() < 1e-9);
        assert!((parse_time_marker("00:01:02.250").unwrap() - 62.25).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse_time_marker(""), Err(TimestampError::Empty)));
        assert!(matches!(parse_time_marker("[]"), Err(TimestampError::Empty)));
        assert!(matches!(parse_time_marker("[music]"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_time_marker("inf"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_time_marker("1e3"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_time_marker("01.5:30"), Err(TimestampError::InvalidValue(_, _))));
        assert!(matches!(parse_time_marker("1:2:3:4"), Err(TimestampError::InvalidFormat(_))));
        assert!(matches!(parse_time_marker("N/A"), Err(TimestampError::InvalidValue(_, _))));
    }

    #[test]
    fn test_negative_timemark() {
        // FFmpeg reports a large negative out_time before the first packet.
        assert!(matches!(
            parse_time_marker("-577014:32:22.775808"),
            Err(TimestampError::Negative)
        ));
    }
}
