//! Per-license daily validation quota.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    /// Counter value to store if the validation goes through.
    pub new_count: u32,
}

/// Decide whether another validation is allowed today.
///
/// Days are UTC calendar dates. A validation on a different date than
/// `last_validated` always passes and restarts the counter at 1.
pub fn check_daily_quota(
    last_validated: Option<DateTime<Utc>>,
    validation_count: u32,
    max_per_day: u32,
    now: DateTime<Utc>,
) -> QuotaDecision {
    let same_day = last_validated.is_some_and(|last| last.date_naive() == now.date_naive());

    if !same_day {
        return QuotaDecision {
            allowed: true,
            new_count: 1,
        };
    }

    if validation_count >= max_per_day {
        return QuotaDecision {
            allowed: false,
            new_count: validation_count,
        };
    }

    QuotaDecision {
        allowed: true,
        new_count: validation_count + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn first_validation_starts_at_one() {
        let decision = check_daily_quota(None, 0, 10, at(1, 9));
        assert_eq!(decision, QuotaDecision { allowed: true, new_count: 1 });
    }

    #[test]
    fn same_day_increments_until_cap() {
        let decision = check_daily_quota(Some(at(1, 8)), 9, 10, at(1, 9));
        assert_eq!(decision, QuotaDecision { allowed: true, new_count: 10 });

        let decision = check_daily_quota(Some(at(1, 8)), 10, 10, at(1, 23));
        assert!(!decision.allowed);
    }

    #[test]
    fn next_day_resets() {
        let decision = check_daily_quota(Some(at(1, 23)), 10, 10, at(2, 0));
        assert_eq!(decision, QuotaDecision { allowed: true, new_count: 1 });
    }

    #[test]
    fn same_hour_on_a_different_day_is_not_same_day() {
        let decision = check_daily_quota(Some(at(1, 12)), 10, 10, at(8, 12));
        assert!(decision.allowed);
    }
}
