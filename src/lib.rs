//! Leave request approval workflow
//!
//! A subject files a leave application, it is checked against the leave
//! type's filing rule and the subject's balance, and an approver then
//! approves, declines or asks to discuss it. Everything is persisted in sled;
//! outbound notifications are returned as intents and delivered separately.

pub mod advisory;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod leave;
pub mod ledger;
pub mod notify;
pub mod policy;
pub mod service;
pub mod telemetry;
pub mod utils;

pub use error::{ErrorKind, LeaveError};
pub use service::{LeaveService, Transition};
