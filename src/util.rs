// Utility helpers for parsing and basic statistics.
//
// This module centralizes the "dirty" cell handling so the rest of the code
// can assume clean, typed values.
use num_format::{Locale, ToFormattedString};

/// Parse a string-like cell into a finite `f64`, forgiving the formatting
/// issues common in spreadsheet exports.
///
/// - Trims whitespace.
/// - Strips thousands separators (`","`) and a trailing `"%"`.
/// - Rejects values that contain alphabetic characters.
/// - Returns `None` for anything that is not a finite number, so NaN and
///   infinities never leave this function.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    // "1e3" would be accepted by `parse`, but so would "NaN" and "inf".
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    let s = s.trim_end_matches('%').replace(',', "");
    let v = s.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

/// Parse a year cell. Integral float spellings like `"2020.0"` are accepted
/// since JSON exports often carry them.
pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = s.parse::<i32>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

/// Fold a column header into a lookup key: lowercase ASCII alphanumerics only.
pub fn fold_header(h: &str) -> String {
    h.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub fn average(v: &[f64]) -> f64 {
    // Returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale-aware thousands separators (`1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let abs_n = n.abs();
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Magnitudes past i64 are printed without separators.
    let mut res = match int_part.parse::<i64>() {
        Ok(v) => v.to_formatted_string(&Locale::en),
        Err(_) => int_part.to_string(),
    };
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}
