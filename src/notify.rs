//! Notification intents and their delivery
//!
//! Workflow transitions only describe what should be said to whom. A
//! [`Dispatcher`] delivers those intents through a [`Notifier`] after the
//! transition is committed; failures are logged and parked in the
//! [`Outbox`], never retried automatically and never rolled back.
use super::advisory::OverlapItem;
use super::error::LeaveError;
use super::leave::{Day, Decision, Period};
use super::utils::new_uuid_to_bech32;
use std::sync::Arc;

pub const OUTBOX_TREE: &str = "outbox";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    #[n(0)]
    pub request_id: u64,
    #[n(1)]
    pub subject: String,
    #[n(2)]
    pub leave_type: String,
    #[n(3)]
    pub period: Period,
    #[n(4)]
    pub days: u32,
    #[n(5)]
    pub excluded: Vec<Day>,
    #[n(6)]
    pub balance: u32,
    #[n(7)]
    pub decision: Option<Decision>,
    #[n(8)]
    pub decider: Option<String>,
    #[n(9)]
    pub proof_note: Option<String>,
    #[n(10)]
    pub advisory: Vec<OverlapItem>,
    #[n(11)]
    pub under_discussion: bool,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    #[n(0)]
    NotifyApprover {
        #[n(0)]
        reissued: bool,
    },
    #[n(1)]
    UpdateApproverMessage,
    #[n(2)]
    NotifySubject,
    #[n(3)]
    NotifyOversight,
    #[n(4)]
    NotifyDiscussionRequested,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    #[n(0)]
    pub kind: IntentKind,
    #[n(1)]
    pub recipient: String,
    #[n(2)]
    pub payload: NotificationPayload,
}

/// Outbound port to the chat platform.
pub trait Notifier: Send + Sync {
    fn notify_approver(
        &self,
        approver: &str,
        payload: &NotificationPayload,
        reissued: bool,
    ) -> anyhow::Result<()>;
    fn update_approver_message(
        &self,
        approver: &str,
        payload: &NotificationPayload,
    ) -> anyhow::Result<()>;
    fn notify_subject(&self, subject: &str, payload: &NotificationPayload) -> anyhow::Result<()>;
    fn notify_oversight(&self, channel: &str, payload: &NotificationPayload)
    -> anyhow::Result<()>;
    fn notify_discussion_requested(
        &self,
        subject: &str,
        payload: &NotificationPayload,
    ) -> anyhow::Result<()>;
}

impl IntentKind {
    /// An essential intent that fails turns the transition into a degraded success.
    pub fn is_essential(&self) -> bool {
        matches!(self, IntentKind::NotifyApprover { .. })
    }
    pub fn label(&self) -> &'static str {
        match self {
            IntentKind::NotifyApprover { reissued: false } => "notify-approver",
            IntentKind::NotifyApprover { reissued: true } => "renotify-approver",
            IntentKind::UpdateApproverMessage => "update-approver-message",
            IntentKind::NotifySubject => "notify-subject",
            IntentKind::NotifyOversight => "notify-oversight",
            IntentKind::NotifyDiscussionRequested => "notify-discussion-requested",
        }
    }
}

impl NotificationPayload {
    fn decision_text(&self) -> &'static str {
        match self.decision {
            Some(Decision::Approve) => "approved",
            Some(Decision::Decline) => "declined",
            None => "pending",
        }
    }
}

impl Intent {
    pub fn new(kind: IntentKind, recipient: &str, payload: NotificationPayload) -> Self {
        Self {
            kind,
            recipient: recipient.to_string(),
            payload,
        }
    }

    /// Plain text rendering a transport can fall back on.
    pub fn render(&self) -> String {
        let p = &self.payload;
        let decider = p.decider.as_deref().unwrap_or("the approver");
        match self.kind {
            IntentKind::NotifyApprover { reissued: false } => {
                let mut text = format!(
                    "{} has requested leave:\nReason: {}\nPeriod: {}\nRequested Days: {}\nRemaining Leave: {}\n{}",
                    p.subject,
                    p.leave_type,
                    p.period,
                    p.days,
                    p.balance,
                    match &p.proof_note {
                        Some(note) => format!("Proof Details: {note}"),
                        None => "No proof details submitted.".to_string(),
                    }
                );
                if !p.advisory.is_empty() {
                    text.push_str("\nDue while away:");
                    for item in &p.advisory {
                        let due = item
                            .due
                            .map(|d| d.to_string())
                            .unwrap_or_else(|| "no due date".to_string());
                        text.push_str(&format!("\n- {} ({})", item.title, due));
                    }
                }
                text
            }
            IntentKind::NotifyApprover { reissued: true } => format!(
                "{} has re-requested leave after discussion for {} days.\nNote: The user has already discussed this leave request.",
                p.subject, p.days
            ),
            IntentKind::UpdateApproverMessage if p.under_discussion => {
                "Leave request is under discussion".to_string()
            }
            IntentKind::UpdateApproverMessage => format!(
                "Leave request has been {} by {}.",
                p.decision_text(),
                decider
            ),
            IntentKind::NotifySubject if p.decision.is_none() => format!(
                "Your leave request for {} days has been applied successfully! The approver will review it shortly.",
                p.days
            ),
            IntentKind::NotifySubject => format!(
                "Your leave request for {} days was {} by {}.",
                p.days,
                p.decision_text(),
                decider
            ),
            IntentKind::NotifyOversight => format!(
                "Leave request from {} for {} days was {} by {}.",
                p.subject,
                p.days,
                p.decision_text(),
                decider
            ),
            IntentKind::NotifyDiscussionRequested => format!(
                "{} wants to discuss your leave request for {} days.\nPlease schedule and complete the meeting. Once done, you can re-request your leave.",
                decider, p.days
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    pub kind: IntentKind,
    pub recipient: String,
    pub error: String,
    pub outbox_id: Option<String>, // None if parking it failed too
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failures: Vec<FailedDelivery>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
    /// True when an essential delivery could not be confirmed.
    pub fn is_degraded(&self) -> bool {
        self.failures.iter().any(|f| f.kind.is_essential())
    }
}

/// Undelivered intents, keyed by a bech32 encoded uuid7.
#[derive(Clone)]
pub struct Outbox {
    tree: sled::Tree,
}

impl Outbox {
    pub fn open(db: &sled::Db) -> Result<Self, LeaveError> {
        Ok(Self {
            tree: db.open_tree(OUTBOX_TREE)?,
        })
    }

    pub fn park(&self, intent: &Intent) -> Result<String, LeaveError> {
        let id = new_uuid_to_bech32("intent_").map_err(|e| LeaveError::Encode(e.to_string()))?;
        self.tree.insert(id.as_bytes(), minicbor::to_vec(intent)?)?;
        Ok(id)
    }

    fn restore(&self, id: &str, intent: &Intent) -> Result<(), LeaveError> {
        self.tree.insert(id.as_bytes(), minicbor::to_vec(intent)?)?;
        Ok(())
    }

    /// Parked intents, oldest first.
    pub fn pending(&self) -> Result<Vec<(String, Intent)>, LeaveError> {
        self.tree
            .iter()
            .map(|entry| -> Result<(String, Intent), LeaveError> {
                let (key, value) = entry?;
                let id = String::from_utf8(key.to_vec())
                    .map_err(|_| LeaveError::CorruptRecord("outbox key"))?;
                Ok((id, minicbor::decode(&value)?))
            })
            .collect()
    }

    /// Remove and return a parked intent.
    pub fn take(&self, id: &str) -> Result<Option<Intent>, LeaveError> {
        match self.tree.remove(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    outbox: Outbox,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, outbox: Outbox) -> Self {
        Self { notifier, outbox }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    fn deliver(&self, intent: &Intent) -> anyhow::Result<()> {
        let to = intent.recipient.as_str();
        let payload = &intent.payload;
        match intent.kind {
            IntentKind::NotifyApprover { reissued } => {
                self.notifier.notify_approver(to, payload, reissued)
            }
            IntentKind::UpdateApproverMessage => self.notifier.update_approver_message(to, payload),
            IntentKind::NotifySubject => self.notifier.notify_subject(to, payload),
            IntentKind::NotifyOversight => self.notifier.notify_oversight(to, payload),
            IntentKind::NotifyDiscussionRequested => {
                self.notifier.notify_discussion_requested(to, payload)
            }
        }
    }

    /// Deliver every intent once, in order. One failure never stops the rest.
    pub fn dispatch(&self, intents: &[Intent]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for intent in intents {
            match self.deliver(intent) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    let outbox_id = match self.outbox.park(intent) {
                        Ok(id) => Some(id),
                        Err(park_err) => {
                            tracing::error!(
                                request_id = intent.payload.request_id,
                                intent = intent.kind.label(),
                                error = %park_err,
                                "failed to park undelivered intent"
                            );
                            None
                        }
                    };
                    if intent.kind.is_essential() {
                        tracing::error!(
                            request_id = intent.payload.request_id,
                            intent = intent.kind.label(),
                            recipient = %intent.recipient,
                            error = %e,
                            outbox_id = ?outbox_id,
                            "essential notification could not be delivered"
                        );
                    } else {
                        tracing::warn!(
                            request_id = intent.payload.request_id,
                            intent = intent.kind.label(),
                            recipient = %intent.recipient,
                            error = %e,
                            outbox_id = ?outbox_id,
                            "notification could not be delivered"
                        );
                    }
                    report.failures.push(FailedDelivery {
                        kind: intent.kind,
                        recipient: intent.recipient.clone(),
                        error: e.to_string(),
                        outbox_id,
                    });
                }
            }
        }

        report
    }

    /// Operator-driven retry of one parked intent. On failure it stays parked under the same id.
    pub fn redeliver(&self, id: &str) -> Result<bool, LeaveError> {
        let Some(intent) = self.outbox.take(id)? else {
            return Ok(false);
        };
        match self.deliver(&intent) {
            Ok(()) => {
                tracing::info!(outbox_id = id, intent = intent.kind.label(), "parked intent delivered");
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(outbox_id = id, error = %e, "parked intent still undeliverable");
                self.outbox.restore(id, &intent)?;
                Ok(false)
            }
        }
    }
}
