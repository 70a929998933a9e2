//! Remaining-time text for active transfers.

use std::time::Duration;

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;

/// Format a duration using its largest unit, rounded to the nearest whole unit.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis() as u64;
    let (value, unit) = if millis >= HOUR_MS {
        ((millis + HOUR_MS / 2) / HOUR_MS, "hour")
    } else if millis >= MINUTE_MS {
        ((millis + MINUTE_MS / 2) / MINUTE_MS, "minute")
    } else {
        ((millis + SECOND_MS / 2) / SECOND_MS, "second")
    };

    if value == 1 {
        format!("{} {}", value, unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

/// Remaining-time text for a transfer, or `None` while the rate is unknown.
pub fn format_eta(bytes_per_sec: u64, total: u64, read: u64) -> Option<String> {
    if bytes_per_sec == 0 {
        return None;
    }
    let remaining_secs = total.saturating_sub(read) / bytes_per_sec;
    Some(format!(
        "{} left",
        format_duration(Duration::from_secs(remaining_secs))
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_nearest_unit() {
        assert_eq!(format_duration(Duration::from_millis(1_499)), "1 second");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "2 seconds");
        assert_eq!(format_duration(Duration::from_secs(89)), "1 minute");
        assert_eq!(format_duration(Duration::from_secs(90)), "2 minutes");
        assert_eq!(format_duration(Duration::from_secs(3_600 + 1_799)), "1 hour");
        assert_eq!(format_duration(Duration::from_secs(3_600 + 1_800)), "2 hours");
    }

    #[test]
    fn test_sub_second_rounds_to_zero() {
        assert_eq!(format_duration(Duration::from_millis(200)), "0 seconds");
    }

    #[test]
    fn test_eta() {
        assert_eq!(format_eta(0, 100, 0), None);
        assert_eq!(format_eta(10, 1_000, 400).as_deref(), Some("1 minute left"));
        assert_eq!(format_eta(10, 100, 200).as_deref(), Some("0 seconds left"));
    }
}
