//! Filing policy checks for a requested leave period
use super::error::{InputError, LeaveError, PolicyViolation};
use super::leave::{Day, FilingRule, LeaveType};

/// Check a requested range against the filing rule of its leave type.
///
/// Rules are applied in order and the first failure wins: range ordering,
/// then either the retroactive window or the advance notice, depending on
/// the type's [`FilingRule`].
pub fn validate(
    leave_type: &LeaveType,
    start: Day,
    end: Day,
    today: Day,
) -> Result<(), LeaveError> {
    if end < start {
        return Err(InputError::InvalidRange { start, end }.into());
    }

    match leave_type.rule {
        FilingRule::Retroactive {
            backdating_window_days,
        } => {
            if start > today {
                return Err(PolicyViolation::FutureDateNotAllowed {
                    leave_type: leave_type.name.clone(),
                }
                .into());
            }
            if backdating_window_days > 0 {
                // Out of chrono's range means nothing can be older than the window.
                if let Some(oldest_allowed) = today.checked_sub_days(backdating_window_days) {
                    if start < oldest_allowed {
                        return Err(PolicyViolation::StaleBackdating {
                            leave_type: leave_type.name.clone(),
                            window_days: backdating_window_days,
                            oldest_allowed,
                        }
                        .into());
                    }
                }
            }
        }
        FilingRule::Prospective {
            minimum_notice_days,
        } => {
            if today.days_until(start) < i64::from(minimum_notice_days) {
                return Err(PolicyViolation::InsufficientNotice {
                    leave_type: leave_type.name.clone(),
                    required_days: minimum_notice_days,
                }
                .into());
            }
        }
    }

    Ok(())
}
