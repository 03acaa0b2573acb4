//! Per-round status derived from a record, the deadline and the clock.
//!
//! A claim against a round succeeds only while the round is `Open`; every
//! other status names the guard that would refuse it.

use rounddrop_core::constants::SECONDS_PER_DAY;
use rounddrop_core::round::RoundRecord;
use rounddrop_core::types::{Amount, RoundIndex, Timestamp};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RoundStatus {
    /// Index outside the configured schedule.
    NotSetup,
    /// Configured but the operator has not deposited yet.
    Unfinanced,
    /// Financed, start time still in the future.
    Upcoming { starts_in: i64 },
    /// Claimable now.
    Open,
    /// Every deposited token has been claimed.
    Exhausted,
    /// The claim deadline has passed.
    Closed,
}

impl std::fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundStatus::NotSetup => write!(f, "not set up"),
            RoundStatus::Unfinanced => write!(f, "awaiting deposit"),
            RoundStatus::Upcoming { starts_in } => write!(f, "opens in {}", format_duration(*starts_in)),
            RoundStatus::Open => write!(f, "open"),
            RoundStatus::Exhausted => write!(f, "fully claimed"),
            RoundStatus::Closed => write!(f, "closed (deadline passed)"),
        }
    }
}

/// One row of the round schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub index: RoundIndex,
    pub start_time: Timestamp,
    pub allocation: Amount,
    pub deposited: Amount,
    pub claimed: Amount,
    pub status: RoundStatus,
}

impl ScheduleEntry {
    pub fn new(index: RoundIndex, record: &RoundRecord, deadline: Option<Timestamp>, now: Timestamp) -> Self {
        Self {
            index,
            start_time: record.start_time,
            allocation: record.allocation,
            deposited: record.deposited,
            claimed: record.claimed,
            status: round_status(record, deadline, now),
        }
    }
}

/// Classify a round at `now`. The deadline outranks everything but setup.
pub fn round_status(record: &RoundRecord, deadline: Option<Timestamp>, now: Timestamp) -> RoundStatus {
    if !record.is_setup() {
        return RoundStatus::NotSetup;
    }
    if matches!(deadline, Some(d) if now >= d) {
        return RoundStatus::Closed;
    }
    if !record.is_financed() {
        return RoundStatus::Unfinanced;
    }
    if !record.has_started(now) {
        return RoundStatus::Upcoming {
            starts_in: record.start_time.saturating_sub(now),
        };
    }
    if record.remaining() == 0 {
        return RoundStatus::Exhausted;
    }
    RoundStatus::Open
}

/// Coarse human duration: days when at least one, else hours, else seconds.
pub fn format_duration(secs: i64) -> String {
    if secs >= SECONDS_PER_DAY {
        format!("{} days", secs / SECONDS_PER_DAY)
    } else if secs >= 3_600 {
        format!("{} hours", secs / 3_600)
    } else {
        format!("{} seconds", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn financed(start: Timestamp, allocation: Amount, claimed: Amount) -> RoundRecord {
        RoundRecord {
            start_time: start,
            allocation,
            deposited: allocation,
            claimed,
        }
    }

    #[test]
    fn status_progression() {
        let unfinanced = RoundRecord::new(100, 50);
        assert_eq!(round_status(&RoundRecord::default(), None, 0), RoundStatus::NotSetup);
        assert_eq!(round_status(&unfinanced, None, 200), RoundStatus::Unfinanced);
        assert_eq!(
            round_status(&financed(100, 50, 0), None, 40),
            RoundStatus::Upcoming { starts_in: 60 }
        );
        assert_eq!(round_status(&financed(100, 50, 0), None, 100), RoundStatus::Open);
        assert_eq!(round_status(&financed(100, 50, 50), None, 100), RoundStatus::Exhausted);
    }

    #[test]
    fn extreme_clock_does_not_overflow() {
        assert_eq!(
            round_status(&financed(i64::MAX, 50, 0), None, i64::MIN),
            RoundStatus::Upcoming { starts_in: i64::MAX }
        );
    }

    #[test]
    fn deadline_closes_every_configured_round() {
        assert_eq!(round_status(&financed(100, 50, 0), Some(500), 500), RoundStatus::Closed);
        assert_eq!(round_status(&RoundRecord::new(100, 50), Some(500), 600), RoundStatus::Closed);
        assert_eq!(round_status(&financed(100, 50, 0), Some(500), 499), RoundStatus::Open);
    }

    #[test]
    fn durations_pick_coarsest_unit() {
        assert_eq!(format_duration(3 * 86_400 + 5), "3 days");
        assert_eq!(format_duration(7_200), "2 hours");
        assert_eq!(format_duration(59), "59 seconds");
    }
}
