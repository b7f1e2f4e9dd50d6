//! Duration parsing and formatting.
//!
//! Accepts the short forms used throughout the config file ("500ms", "5s",
//! "3m", "1h", or a bare number of seconds) as well as ISO-8601 durations
//! ("PT3M", "PT1M30S", "P1DT2H"). Durations reported in health details are
//! rendered back as ISO-8601.

use std::fmt::Write;
use std::time::Duration;

/// Parse a duration string like "5s", "500ms", "3m", "1h" or "PT3M".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.starts_with(['P', 'p']) {
        return parse_iso8601(&s.to_ascii_uppercase());
    }
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled(mins.parse::<u64>().ok()?, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours.parse::<u64>().ok()?, 3600)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Render a duration in ISO-8601 form: `PT3M`, `PT1M1.5S`, `PT0S`.
///
/// Days are folded into hours.
pub fn format_iso8601(d: Duration) -> String {
    let total = d.as_secs();
    let nanos = d.subsec_nanos();
    if total == 0 && nanos == 0 {
        return "PT0S".to_string();
    }

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    let mut out = String::from("PT");
    if hours > 0 {
        let _ = write!(out, "{hours}H");
    }
    if minutes > 0 {
        let _ = write!(out, "{minutes}M");
    }
    if secs > 0 || nanos > 0 {
        let _ = write!(out, "{secs}");
        if nanos > 0 {
            let frac = format!("{nanos:09}");
            let _ = write!(out, ".{}", frac.trim_end_matches('0'));
        }
        out.push('S');
    }
    out
}

fn parse_iso8601(s: &str) -> Option<Duration> {
    let rest = s.strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (rest, None),
    };

    let mut total = Duration::ZERO;
    let mut any = false;

    if !date.is_empty() {
        let days = date.strip_suffix('D')?.parse::<u64>().ok()?;
        total = total.checked_add(scaled(days, 86_400)?)?;
        any = true;
    }

    if let Some(time) = time {
        let mut num = String::new();
        for c in time.chars() {
            match c {
                '0'..='9' | '.' => num.push(c),
                'H' => {
                    total = total.checked_add(scaled(num.parse::<u64>().ok()?, 3600)?)?;
                    num.clear();
                    any = true;
                }
                'M' => {
                    total = total.checked_add(scaled(num.parse::<u64>().ok()?, 60)?)?;
                    num.clear();
                    any = true;
                }
                'S' => {
                    total = total.checked_add(parse_fractional_secs(&num)?)?;
                    num.clear();
                    any = true;
                }
                _ => return None,
            }
        }
        // Trailing digits without a unit designator.
        if !num.is_empty() {
            return None;
        }
    }

    any.then_some(total)
}

/// `n` units of `unit_secs` seconds, or `None` on overflow.
fn scaled(n: u64, unit_secs: u64) -> Option<Duration> {
    n.checked_mul(unit_secs).map(Duration::from_secs)
}

fn parse_fractional_secs(s: &str) -> Option<Duration> {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let secs = whole.parse::<u64>().ok()?;
    if frac.is_empty() {
        return Some(Duration::from_secs(secs));
    }
    if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let nanos = format!("{frac:0<9}").parse::<u32>().ok()?;
    Some(Duration::new(secs, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("180s"), Some(Duration::from_secs(180)));
    }

    #[test]
    fn parse_duration_milliseconds() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn parse_duration_minutes_and_hours() {
        assert_eq!(parse_duration("3m"), Some(Duration::from_secs(180)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn parse_duration_plain_number_as_seconds() {
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn parse_duration_iso8601() {
        assert_eq!(parse_duration("PT3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_duration("pt1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("PT0.25S"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("P1DT2H"), Some(Duration::from_secs(26 * 3600)));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration("PT"), None);
        assert_eq!(parse_duration("PT5"), None);
        assert_eq!(parse_duration("PT1X"), None);
    }

    #[test]
    fn parse_duration_overflow_is_rejected() {
        assert_eq!(parse_duration("307445734561825862m"), None);
        assert_eq!(parse_duration("5124095576030432h"), None);
        assert_eq!(parse_duration("P999999999999999D"), None);
        assert_eq!(parse_duration("PT5124095576030432H"), None);
        assert_eq!(parse_duration("PT307445734561825862M"), None);
        // Each part fits on its own, the sum does not.
        assert_eq!(parse_duration("PT18446744073709551615S1S"), None);
        assert_eq!(parse_duration("P213503982334601DT8H"), None);
    }

    #[test]
    fn format_iso8601_matches_common_forms() {
        assert_eq!(format_iso8601(Duration::ZERO), "PT0S");
        assert_eq!(format_iso8601(Duration::from_secs(180)), "PT3M");
        assert_eq!(format_iso8601(Duration::from_secs(240)), "PT4M");
        assert_eq!(format_iso8601(Duration::from_millis(61_500)), "PT1M1.5S");
        assert_eq!(format_iso8601(Duration::from_secs(3661)), "PT1H1M1S");
        assert_eq!(format_iso8601(Duration::from_secs(2 * 86_400)), "PT48H");
    }

    #[test]
    fn iso8601_output_parses_back() {
        let d = Duration::from_millis(3_723_040);
        assert_eq!(parse_duration(&format_iso8601(d)), Some(d));
    }
}
