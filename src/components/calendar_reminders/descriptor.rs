use lazy_static::lazy_static;
use regex::Regex;

pub const MINUTE_MS: u64 = 60_000;
pub const HOUR_MS: u64 = 3_600_000;
pub const DAY_MS: u64 = 86_400_000;

lazy_static! {
    static ref UNIT_DESCRIPTOR: Regex =
        Regex::new(r"(?i)^\s*(\d+)\s*(minute|hour|day)s?\s*$").expect("descriptor pattern is valid");
}

/// Convert a reminder descriptor into an offset in milliseconds.
///
/// Accepts a plain non-negative number (already milliseconds) or
/// `<integer> <unit>` with unit `minute`, `hour` or `day`, optionally plural.
/// Returns `0` for anything else; callers must treat `0` as "skip", never as
/// "fire now".
pub fn parse_descriptor(descriptor: Option<&str>) -> u64 {
    let Some(descriptor) = descriptor else {
        return 0;
    };

    if let Some(ms) = parse_millis(descriptor) {
        return ms;
    }

    let Some(caps) = UNIT_DESCRIPTOR.captures(descriptor) else {
        return 0;
    };

    let Ok(amount) = caps[1].parse::<u64>() else {
        return 0;
    };

    let unit_ms = match caps[2].to_ascii_lowercase().as_str() {
        "minute" => MINUTE_MS,
        "hour" => HOUR_MS,
        "day" => DAY_MS,
        _ => return 0,
    };

    amount.checked_mul(unit_ms).unwrap_or(0)
}

fn parse_millis(descriptor: &str) -> Option<u64> {
    let trimmed = descriptor.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = trimmed.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || value > u64::MAX as f64 {
        return None;
    }
    // Positive offsets under 1 ms stay valid
    if value > 0.0 && value < 1.0 {
        return Some(1);
    }
    Some(value.trunc() as u64)
}
