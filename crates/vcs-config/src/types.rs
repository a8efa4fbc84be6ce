//! Typed readings of raw values.

/// `true/yes/on/1` and `false/no/off/0/""`, case-insensitive. Other
/// integers are true when non-zero.
pub fn parse_bool(value: &str) -> Option<bool> {
    let v = value.trim();
    match v.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" | "" => Some(false),
        _ => v.parse::<i64>().ok().map(|n| n != 0),
    }
}

/// Decimal integer with an optional `k`, `m` or `g` (powers of 1024) suffix.
pub fn parse_int(value: &str) -> Option<i64> {
    let v = value.trim();
    let (digits, scale) = match v.char_indices().last() {
        Some((i, 'k' | 'K')) => (&v[..i], 1 << 10),
        Some((i, 'm' | 'M')) => (&v[..i], 1 << 20),
        Some((i, 'g' | 'G')) => (&v[..i], 1 << 30),
        _ => (v, 1),
    };
    digits.parse::<i64>().ok()?.checked_mul(scale)
}
