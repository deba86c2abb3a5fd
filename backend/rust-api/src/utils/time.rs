use chrono::{DateTime, Utc};

/// Signed number of seconds from `earlier` to `later`, with millisecond
/// resolution.
pub fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn seconds_between_keeps_sign_and_millis() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(1500);
        assert_eq!(seconds_between(t1, t0), 1.5);
        assert_eq!(seconds_between(t0, t1), -1.5);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round_to_hundredths(12.345_6), 12.35);
        assert_eq!(round_to_hundredths(0.0), 0.0);
    }
}
