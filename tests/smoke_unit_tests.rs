//! Smoke Screen Unit tests for leave approval components
//!
//! These tests span the public API and check components in isolation from
//! the workflow scenarios. They mostly cover the happy path.
//!

use chrono::Utc;
use leave_approval::{
    advisory::OverlapItem,
    calendar::chargeable_days,
    config::{DiscussionScope, WorkflowConfig},
    error::{ErrorKind, InputError, LeaveError, StateConflict},
    leave::{Day, Decision, LeaveApplication, LeaveStatus, LeaveType, Period, TimeStamp},
    notify::{Intent, IntentKind, NotificationPayload},
    utils::new_uuid_to_bech32,
};

fn day(value: &str) -> Day {
    Day::parse(value).unwrap()
}

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Generated ids carry the human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let encoded = new_uuid_to_bech32("intent_").unwrap();
        assert!(encoded.starts_with("intent_1"));
        assert!(encoded.len() > 10);
    }

    /// An empty prefix is not a valid hrp
    #[test]
    fn handles_empty_hrp() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("intent_").unwrap();
        let id2 = new_uuid_to_bech32("intent_").unwrap();
        assert_ne!(id1, id2);
    }
}

// LEAVE MODULE TESTS
#[cfg(test)]
mod leave_tests {
    use super::*;

    /// TimeStamp::new() is close to the current time
    #[test]
    fn timestamp_new_creates_current_time() {
        let ts = TimeStamp::new();
        let diff = (Utc::now() - ts.to_datetime_utc()).num_seconds().abs();
        assert!(diff < 1);
    }

    #[test]
    fn timestamp_cbor_roundtrip() {
        let original = TimeStamp::new();

        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: TimeStamp<Utc> = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
    }

    /// Dates arrive as YYYY-MM-DD strings from the transport
    #[test]
    fn day_parses_iso_dates_only() {
        assert_eq!(day("2024-06-12").to_string(), "2024-06-12");
        assert!(matches!(
            Day::parse("12/06/2024"),
            Err(InputError::InvalidDate(_))
        ));
    }

    #[test]
    fn application_builder_sets_fields() {
        let application = LeaveApplication::new()
            .set_subject("U01")
            .set_leave_type("Sick")
            .set_period(day("2024-06-03"), day("2024-06-04"))
            .set_proof_note("doctor's note")
            .finalise()
            .unwrap();

        assert_eq!(application.subject, "U01");
        assert_eq!(application.leave_type, "Sick");
        assert_eq!(application.start, day("2024-06-03"));
        assert_eq!(application.proof_note.as_deref(), Some("doctor's note"));
    }

    /// Missing fields are reported in form order
    #[test]
    fn application_builder_reports_first_missing_field() {
        let err = LeaveApplication::new()
            .set_leave_type("Casual")
            .finalise()
            .unwrap_err();
        assert_eq!(err, InputError::MissingField("subject"));

        let err = LeaveApplication::new()
            .set_subject("U01")
            .set_leave_type("   ")
            .finalise()
            .unwrap_err();
        assert_eq!(err, InputError::MissingField("reason for leave"));

        let err = LeaveApplication::new()
            .set_subject("U01")
            .set_leave_type("Casual")
            .set_start(day("2024-06-12"))
            .finalise()
            .unwrap_err();
        assert_eq!(err, InputError::MissingField("end date"));
    }

    #[test]
    fn leave_type_constructors_set_rule() {
        let casual = LeaveType::prospective("Casual", 6, 1);
        assert_eq!(casual.minimum_notice_days(), 1);
        assert_eq!(casual.backdating_window_days(), 0);

        let sick = LeaveType::retroactive("Sick", 14, 14);
        assert_eq!(sick.minimum_notice_days(), 0);
        assert_eq!(sick.backdating_window_days(), 14);
    }

    #[test]
    fn decisions_map_to_terminal_statuses() {
        assert_eq!(Decision::Approve.status(), LeaveStatus::Approved);
        assert_eq!(Decision::Decline.status(), LeaveStatus::Declined);
        assert!(!LeaveStatus::Pending.is_terminal());
        assert!(LeaveStatus::Declined.is_terminal());
    }
}

// CALENDAR MODULE TESTS
#[cfg(test)]
mod calendar_tests {
    use super::*;

    /// Friday to Monday charges Friday and Monday only
    #[test]
    fn weekend_is_excluded() {
        let days = chargeable_days(day("2024-06-14"), day("2024-06-17")).unwrap();
        assert_eq!(days.count, 2);
        assert_eq!(days.excluded, vec![day("2024-06-15"), day("2024-06-16")]);
    }

    #[test]
    fn weekend_only_range_is_zero() {
        let days = chargeable_days(day("2024-06-15"), day("2024-06-16")).unwrap();
        assert_eq!(days.count, 0);
    }
}

// ERROR MODULE TESTS
#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn errors_are_classified() {
        let balance = LeaveError::InsufficientBalance { remaining: 3 };
        assert_eq!(balance.kind(), ErrorKind::Balance);
        assert_eq!(balance.code(), "INSUFFICIENT_BALANCE");

        let conflict: LeaveError = StateConflict::DiscussionRequired {
            subject: "U01".into(),
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::StateConflict);
        assert_eq!(conflict.code(), "DISCUSSION_REQUIRED");
    }

    /// The user-facing text for a balance failure mentions what is left
    #[test]
    fn insufficient_balance_message() {
        let err = LeaveError::InsufficientBalance { remaining: 3 };
        assert_eq!(
            err.to_string(),
            "Insufficient leave balance: 3 day(s) remaining"
        );
    }
}

// CONFIG MODULE TESTS
#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn default_catalogue_matches_seed_types() {
        let names: Vec<String> = WorkflowConfig::default_leave_types()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["Casual", "Sick", "Vacation", "Personal", "Other"]);
    }

    #[test]
    fn discussion_scope_parses() {
        assert_eq!("subject".parse::<DiscussionScope>(), Ok(DiscussionScope::Subject));
        assert_eq!(" REQUEST ".parse::<DiscussionScope>(), Ok(DiscussionScope::Request));
        assert!("team".parse::<DiscussionScope>().is_err());
    }
}

// NOTIFY MODULE TESTS
#[cfg(test)]
mod notify_tests {
    use super::*;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            request_id: 1,
            subject: "U01".into(),
            leave_type: "Sick".into(),
            period: Period::new(day("2024-06-03"), day("2024-06-04")).unwrap(),
            days: 2,
            excluded: vec![],
            balance: 14,
            decision: None,
            decider: None,
            proof_note: None,
            advisory: vec![OverlapItem {
                title: "Sprint review".into(),
                due: None,
                project_label: None,
            }],
            under_discussion: false,
        }
    }

    #[test]
    fn approver_message_lists_request_details() {
        let text = Intent::new(
            IntentKind::NotifyApprover { reissued: false },
            "U0MANAGER",
            payload(),
        )
        .render();

        assert!(text.starts_with("U01 has requested leave:"));
        assert!(text.contains("Requested Days: 2"));
        assert!(text.contains("Remaining Leave: 14"));
        assert!(text.contains("No proof details submitted."));
        assert!(text.contains("- Sprint review (no due date)"));
    }

    #[test]
    fn only_approver_notices_are_essential() {
        assert!(IntentKind::NotifyApprover { reissued: true }.is_essential());
        assert!(!IntentKind::NotifyOversight.is_essential());
        assert!(!IntentKind::NotifyDiscussionRequested.is_essential());
    }

    #[test]
    fn intent_cbor_roundtrip() {
        let intent = Intent::new(IntentKind::NotifySubject, "U01", payload());
        let encoded = minicbor::to_vec(&intent).unwrap();
        let decoded: Intent = minicbor::decode(&encoded).unwrap();
        assert_eq!(decoded, intent);
    }
}
