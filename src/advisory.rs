//! Best-effort lookup of work items due while the subject is away
//!
//! Nothing here can fail a workflow operation: an unmapped subject, a
//! failing task source or a slow one all degrade to an empty advisory.
use super::leave::{Day, Period};
use chrono::{DateTime, NaiveDate};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};

/// A work item as the external task system reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskItem {
    pub title: String,
    pub due_date: Option<String>,
    pub project_label: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OverlapItem {
    #[n(0)]
    pub title: String,
    #[n(1)]
    pub due: Option<Day>, // None when missing or unparseable
    #[n(2)]
    pub project_label: Option<String>,
}

/// Outbound port to the task system.
pub trait TaskSource: Send + Sync {
    fn fetch_overlaps(
        &self,
        external_subject_id: &str,
        start: Day,
        end: Day,
    ) -> anyhow::Result<Vec<TaskItem>>;
}

/// Maps a workflow subject onto its identity in the task system.
pub trait IdentityLookup: Send + Sync {
    fn external_id(&self, subject: &str) -> Option<String>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticIdentities(HashMap<String, String>);

impl StaticIdentities {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with(mut self, subject: &str, external_id: &str) -> Self {
        self.0.insert(subject.to_string(), external_id.to_string());
        self
    }
}

impl IdentityLookup for StaticIdentities {
    fn external_id(&self, subject: &str) -> Option<String> {
        self.0.get(subject).cloned()
    }
}

impl<S: Into<String>> FromIterator<(S, S)> for StaticIdentities {
    fn from_iter<I: IntoIterator<Item = (S, S)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(a, b)| (a.into(), b.into())).collect())
    }
}

#[derive(Clone)]
pub struct OverlapAdvisor {
    source: Arc<dyn TaskSource>,
    identities: Arc<dyn IdentityLookup>,
    timeout: Duration,
}

/// A lookup running on its own thread. Resolve it with [`PendingOverlaps::wait`].
pub struct PendingOverlaps {
    subject: String,
    receiver: Option<mpsc::Receiver<anyhow::Result<Vec<TaskItem>>>>,
    deadline: Instant,
}

impl OverlapAdvisor {
    pub fn new(
        source: Arc<dyn TaskSource>,
        identities: Arc<dyn IdentityLookup>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            identities,
            timeout,
        }
    }

    /// Start the lookup in the background and return immediately.
    pub fn begin(&self, subject: &str, period: Period) -> PendingOverlaps {
        let Some(external_id) = self.identities.external_id(subject) else {
            tracing::debug!(subject, "no task system identity, skipping advisory");
            return PendingOverlaps::empty();
        };

        let (sender, receiver) = mpsc::channel();
        let source = Arc::clone(&self.source);
        let spawned = std::thread::Builder::new()
            .name("overlap-advisor".into())
            .spawn(move || {
                // the receiver may have timed out already, nobody is listening then
                let _ = sender.send(source.fetch_overlaps(&external_id, period.start(), period.end()));
            });

        if let Err(e) = spawned {
            tracing::warn!(subject, error = %e, "could not start advisory lookup");
            return PendingOverlaps::empty();
        }

        PendingOverlaps {
            subject: subject.to_string(),
            receiver: Some(receiver),
            deadline: Instant::now() + self.timeout,
        }
    }

    /// Items due inside `period`, earliest first, undated items last.
    pub fn overlaps(&self, subject: &str, period: Period) -> impl Iterator<Item = OverlapItem> + use<> {
        self.begin(subject, period).wait()
    }
}

impl PendingOverlaps {
    pub fn empty() -> Self {
        Self {
            subject: String::new(),
            receiver: None,
            deadline: Instant::now(),
        }
    }

    /// Block until the lookup answers or the deadline passes.
    pub fn wait(self) -> std::vec::IntoIter<OverlapItem> {
        let Some(receiver) = self.receiver else {
            return Vec::new().into_iter();
        };
        let remaining = self.deadline.saturating_duration_since(Instant::now());

        let items = match receiver.recv_timeout(remaining) {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                tracing::warn!(subject = %self.subject, error = %e, "advisory lookup failed");
                Vec::new()
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(subject = %self.subject, "advisory lookup timed out");
                Vec::new()
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::warn!(subject = %self.subject, "advisory lookup ended without an answer");
                Vec::new()
            }
        };

        order_by_due(items.into_iter().map(OverlapItem::from).collect()).into_iter()
    }
}

impl From<TaskItem> for OverlapItem {
    fn from(value: TaskItem) -> Self {
        Self {
            due: value.due_date.as_deref().and_then(parse_due),
            title: value.title,
            project_label: value.project_label,
        }
    }
}

/// Accepts a plain `YYYY-MM-DD` or an RFC 3339 timestamp.
fn parse_due(value: &str) -> Option<Day> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
        .map(Day::from)
}

// stable, so items sharing a due date keep the source's order
fn order_by_due(mut items: Vec<OverlapItem>) -> Vec<OverlapItem> {
    items.sort_by(|a, b| match (a.due, b.due) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    items
}
