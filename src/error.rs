use crate::leave::{Day, LeaveStatus};

/// Malformed or incomplete input. Nothing is persisted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("End date {end} cannot be before start date {start}")]
    InvalidRange { start: Day, end: Day },
    #[error("Please provide a {0}")]
    MissingField(&'static str),
    #[error("'{0}' is not a valid date, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("Unknown leave type '{0}'")]
    UnknownLeaveType(String),
    #[error("Leave type '{0}' is already registered")]
    DuplicateLeaveType(String),
    #[error("{start} to {end} contains no working days")]
    NoChargeableDays { start: Day, end: Day },
    #[error("The {0} contains a NUL character")]
    InvalidIdentifier(&'static str),
}

/// A filing rule of the leave type rejected the requested dates.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("{leave_type} start date cannot be in the future")]
    FutureDateNotAllowed { leave_type: String },
    #[error("{leave_type} can only be filed up to {window_days} days back (no earlier than {oldest_allowed})")]
    StaleBackdating {
        leave_type: String,
        window_days: u32,
        oldest_allowed: Day,
    },
    #[error("{leave_type} requires at least {required_days} day(s) notice")]
    InsufficientNotice {
        leave_type: String,
        required_days: u32,
    },
}

/// The transition guard refused the operation. The caller is told the current state.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateConflict {
    #[error("Leave request {request_id} has already been {status}")]
    AlreadyDecided {
        request_id: u64,
        status: LeaveStatus,
    },
    #[error("{subject} needs to discuss the leave request with the approver before re-requesting")]
    DiscussionRequired { subject: String },
    #[error("Leave request {request_id} was not filed by {subject}")]
    NotRequester { request_id: u64, subject: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Policy,
    Balance,
    StateConflict,
    Storage,
}

#[derive(thiserror::Error, Debug)]
pub enum LeaveError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Policy(#[from] PolicyViolation),
    #[error("Insufficient leave balance: {remaining} day(s) remaining")]
    InsufficientBalance { remaining: u32 },
    #[error(transparent)]
    Conflict(#[from] StateConflict),
    #[error("Leave request {0} does not exist")]
    RequestNotFound(u64),
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("Corrupt {0} record")]
    CorruptRecord(&'static str),
}

impl LeaveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaveError::Input(_) | LeaveError::RequestNotFound(_) => ErrorKind::Input,
            LeaveError::Policy(_) => ErrorKind::Policy,
            LeaveError::InsufficientBalance { .. } => ErrorKind::Balance,
            LeaveError::Conflict(_) => ErrorKind::StateConflict,
            LeaveError::Storage(_)
            | LeaveError::Encode(_)
            | LeaveError::Decode(_)
            | LeaveError::CorruptRecord(_) => ErrorKind::Storage,
        }
    }

    /// Stable code for programmatic handling by the transport layer.
    pub fn code(&self) -> &'static str {
        match self {
            LeaveError::Input(e) => match e {
                InputError::InvalidRange { .. } => "INVALID_RANGE",
                InputError::MissingField(_) => "MISSING_FIELD",
                InputError::InvalidDate(_) => "INVALID_DATE",
                InputError::UnknownLeaveType(_) => "UNKNOWN_LEAVE_TYPE",
                InputError::DuplicateLeaveType(_) => "DUPLICATE_LEAVE_TYPE",
                InputError::NoChargeableDays { .. } => "NO_CHARGEABLE_DAYS",
                InputError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            },
            LeaveError::Policy(e) => match e {
                PolicyViolation::FutureDateNotAllowed { .. } => "FUTURE_DATE_NOT_ALLOWED",
                PolicyViolation::StaleBackdating { .. } => "STALE_BACKDATING",
                PolicyViolation::InsufficientNotice { .. } => "INSUFFICIENT_NOTICE",
            },
            LeaveError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LeaveError::Conflict(e) => match e {
                StateConflict::AlreadyDecided { .. } => "ALREADY_DECIDED",
                StateConflict::DiscussionRequired { .. } => "DISCUSSION_REQUIRED",
                StateConflict::NotRequester { .. } => "NOT_REQUESTER",
            },
            LeaveError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            LeaveError::Storage(_) => "STORAGE",
            LeaveError::Encode(_) => "ENCODE",
            LeaveError::Decode(_) => "DECODE",
            LeaveError::CorruptRecord(_) => "CORRUPT_RECORD",
        }
    }
}

impl<W: std::fmt::Display> From<minicbor::encode::Error<W>> for LeaveError {
    fn from(value: minicbor::encode::Error<W>) -> Self {
        LeaveError::Encode(value.to_string())
    }
}

/// Abort the surrounding sled transaction with `err`.
pub(crate) fn abort<E: Into<LeaveError>>(
    err: E,
) -> sled::transaction::ConflictableTransactionError<LeaveError> {
    sled::transaction::ConflictableTransactionError::Abort(err.into())
}

/// Unwrap a sled transaction result, surfacing the aborted error as-is.
impl From<sled::transaction::TransactionError<LeaveError>> for LeaveError {
    fn from(value: sled::transaction::TransactionError<LeaveError>) -> Self {
        match value {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => LeaveError::Storage(e),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("Invalid value '{value}' for {var}")]
    InvalidValue { var: &'static str, value: String },
}
