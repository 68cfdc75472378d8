//! Workflow configuration, read from the environment
use super::error::ConfigError;
use super::leave::LeaveType;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// What a manager's "discuss" unlocks a re-request for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscussionScope {
    /// One gate per subject, shared by all of their requests.
    #[default]
    Subject,
    /// One gate per discussed request.
    Request,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub db_path: PathBuf,
    pub approver_id: String,
    pub oversight_channel: String,
    pub advisory_timeout: Duration,
    pub discussion_scope: DiscussionScope,
}

impl FromStr for DiscussionScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "subject" => Ok(DiscussionScope::Subject),
            "request" => Ok(DiscussionScope::Request),
            _ => Err(ConfigError::InvalidValue {
                var: "LEAVE_DISCUSSION_SCOPE",
                value: s.to_string(),
            }),
        }
    }
}

impl WorkflowConfig {
    pub const DEFAULT_DB_PATH: &'static str = "leave.db";
    pub const DEFAULT_ADVISORY_TIMEOUT: Duration = Duration::from_millis(1500);

    pub fn new(approver_id: &str, oversight_channel: &str) -> Self {
        Self {
            db_path: PathBuf::from(Self::DEFAULT_DB_PATH),
            approver_id: approver_id.to_string(),
            oversight_channel: oversight_channel.to_string(),
            advisory_timeout: Self::DEFAULT_ADVISORY_TIMEOUT,
            discussion_scope: DiscussionScope::default(),
        }
    }

    pub fn with_discussion_scope(mut self, scope: DiscussionScope) -> Self {
        self.discussion_scope = scope;
        self
    }

    pub fn with_advisory_timeout(mut self, timeout: Duration) -> Self {
        self.advisory_timeout = timeout;
        self
    }

    /// Load from the process environment, after applying a `.env` file if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingVar(var))
        };

        let advisory_timeout = match lookup("LEAVE_ADVISORY_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidValue {
                    var: "LEAVE_ADVISORY_TIMEOUT_MS",
                    value: raw.clone(),
                })?,
            None => Self::DEFAULT_ADVISORY_TIMEOUT,
        };

        let discussion_scope = match lookup("LEAVE_DISCUSSION_SCOPE") {
            Some(raw) => raw.parse()?,
            None => DiscussionScope::default(),
        };

        Ok(Self {
            db_path: lookup("LEAVE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DB_PATH)),
            approver_id: required("LEAVE_APPROVER_ID")?,
            oversight_channel: required("LEAVE_OVERSIGHT_CHANNEL")?,
            advisory_timeout,
            discussion_scope,
        })
    }

    /// Seed catalogue for a fresh database.
    pub fn default_leave_types() -> Vec<LeaveType> {
        vec![
            LeaveType::prospective("Casual", 6, 1),
            LeaveType::retroactive("Sick", 14, 14),
            LeaveType::prospective("Vacation", 15, 7),
            LeaveType::prospective("Personal", 3, 0),
            LeaveType::prospective("Other", 3, 1),
        ]
    }
}
