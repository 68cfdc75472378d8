//! Property-based tests for business day counting and filing policy
//!
//! Dates are drawn as offsets from a fixed base so every generated range is
//! valid for chrono.

use chrono::{Days, NaiveDate, Weekday};
use leave_approval::{
    calendar::chargeable_days,
    error::{LeaveError, PolicyViolation},
    leave::{Day, LeaveType},
    policy::validate,
};
use proptest::prelude::*;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn offset(days: u64) -> Day {
    Day::new(base().checked_add_days(Days::new(days)).unwrap())
}

/// Strategy for an ordered (start, end) pair spanning up to eight weeks
fn range_strategy() -> impl Strategy<Value = (Day, Day)> {
    (0u64..=1500, 0u64..=56).prop_map(|(start, len)| (offset(start), offset(start + len)))
}

proptest! {
    #[test]
    fn prop_counted_and_excluded_cover_the_range((start, end) in range_strategy()) {
        let days = chargeable_days(start, end).unwrap();
        let span = (start.days_until(end) + 1) as u32;

        prop_assert_eq!(days.total(), span);
        prop_assert!(days.excluded.iter().all(|d| d.is_weekend()));
        prop_assert!(days.excluded.iter().all(|d| *d >= start && *d <= end));
        prop_assert!(days.excluded.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_any_full_week_charges_five_days(start in 0u64..=1500, weeks in 1u64..=6) {
        let days = chargeable_days(offset(start), offset(start + weeks * 7 - 1)).unwrap();
        prop_assert_eq!(days.count as u64, weeks * 5);
    }

    #[test]
    fn prop_weekday_only_range_excludes_nothing(start in 0u64..=1500) {
        // walk forward to the next Monday, Monday to Friday has nothing to exclude
        let monday = (0..7)
            .map(|k| offset(start + k))
            .find(|d| d.weekday() == Weekday::Mon)
            .unwrap();
        let friday = Day::new(monday.date().checked_add_days(Days::new(4)).unwrap());

        let days = chargeable_days(monday, friday).unwrap();
        prop_assert_eq!(days.count, 5);
        prop_assert!(days.excluded.is_empty());
    }

    #[test]
    fn prop_inverted_range_is_rejected((start, end) in range_strategy()) {
        prop_assume!(start != end);
        prop_assert!(chargeable_days(end, start).is_err());

        let casual = LeaveType::prospective("Casual", 6, 1);
        let err = validate(&casual, end, start, offset(0)).unwrap_err();
        prop_assert_eq!(err.code(), "INVALID_RANGE");
    }

    /// Prospective leave passes exactly when the start is at least `notice` days out.
    #[test]
    fn prop_notice_threshold(today in 0u64..=1000, lead in 0u64..=30, notice in 0u32..=14) {
        let leave_type = LeaveType::prospective("Vacation", 15, notice);
        let start = offset(today + lead);

        let result = validate(&leave_type, start, start, offset(today));
        if lead >= u64::from(notice) {
            prop_assert!(result.is_ok());
        } else {
            let is_notice = matches!(
                result,
                Err(LeaveError::Policy(PolicyViolation::InsufficientNotice { required_days, .. }))
                    if required_days == notice
            );
            prop_assert!(is_notice);
        }
    }

    /// Retroactive leave never starts in the future and never before the window.
    #[test]
    fn prop_backdating_window(today in 30u64..=1000, back in 0u64..=30, ahead in 1u64..=10) {
        let sick = LeaveType::retroactive("Sick", 14, 14);
        let start = offset(today - back);

        let result = validate(&sick, start, offset(today), offset(today));
        if back <= 14 {
            prop_assert!(result.is_ok());
        } else {
            prop_assert_eq!(result.unwrap_err().code(), "STALE_BACKDATING");
        }

        let future = offset(today + ahead);
        let err = validate(&sick, future, future, offset(today)).unwrap_err();
        prop_assert_eq!(err.code(), "FUTURE_DATE_NOT_ALLOWED");
    }

    /// A zero window puts no lower bound on how far back retroactive leave may start.
    #[test]
    fn prop_zero_window_is_unbounded(today in 1500u64..=3000, back in 0u64..=1500) {
        let open_ended = LeaveType::retroactive("Bereavement", 5, 0);
        prop_assert!(validate(&open_ended, offset(today - back), offset(today), offset(today)).is_ok());
    }
}
