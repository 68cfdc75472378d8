//! Walks one request through submit, discuss, re-request and approve.
//!
//! Reads `LEAVE_*` variables (or a `.env` file) when present and falls back
//! to a throwaway database otherwise. `RUST_LOG=debug` shows rejections too.
use leave_approval::{
    LeaveService,
    config::WorkflowConfig,
    leave::{Day, Decision, LeaveApplication},
    notify::{Dispatcher, NotificationPayload, Notifier, Outbox},
    telemetry::init_tracing,
};
use std::sync::Arc;

// prints instead of posting to a chat platform
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify_approver(&self, approver: &str, p: &NotificationPayload, reissued: bool) -> anyhow::Result<()> {
        tracing::info!(to = approver, request_id = p.request_id, reissued, "-> approver");
        Ok(())
    }
    fn update_approver_message(&self, approver: &str, p: &NotificationPayload) -> anyhow::Result<()> {
        tracing::info!(to = approver, request_id = p.request_id, "-> approver message updated");
        Ok(())
    }
    fn notify_subject(&self, subject: &str, p: &NotificationPayload) -> anyhow::Result<()> {
        tracing::info!(to = subject, request_id = p.request_id, "-> subject");
        Ok(())
    }
    fn notify_oversight(&self, channel: &str, p: &NotificationPayload) -> anyhow::Result<()> {
        tracing::info!(to = channel, request_id = p.request_id, "-> oversight");
        Ok(())
    }
    fn notify_discussion_requested(&self, subject: &str, p: &NotificationPayload) -> anyhow::Result<()> {
        tracing::info!(to = subject, request_id = p.request_id, "-> discussion requested");
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing("info")?;

    let temp_dir = tempfile::tempdir()?;
    let config = WorkflowConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "no workflow config in environment, using a scratch database");
        let mut config = WorkflowConfig::new("U0MANAGER", "C0HR");
        config.db_path = temp_dir.path().join("leave.db");
        config
    });

    let db = Arc::new(sled::open(&config.db_path)?);
    let approver = config.approver_id.clone();
    let service = LeaveService::new(db.clone(), config)?;
    service.install_leave_types(&WorkflowConfig::default_leave_types())?;
    let dispatcher = Dispatcher::new(Arc::new(ConsoleNotifier), Outbox::open(&db)?);

    let today = Day::today();
    let start = today
        .succ()
        .and_then(|d| d.succ())
        .ok_or_else(|| anyhow::anyhow!("date out of range"))?;

    let application = LeaveApplication::new()
        .set_subject("U01")
        .set_leave_type("Casual")
        .set_period(start, start);

    let submitted = match service.submit(application, today) {
        Ok(t) => t,
        Err(e) => {
            // a weekend start has nothing to charge
            tracing::warn!(code = e.code(), "{e}");
            return Ok(());
        }
    };
    let id = submitted.request.id;
    println!("{}", submitted.summary());
    dispatcher.dispatch(&submitted.intents);

    dispatcher.dispatch(&service.discuss(id, &approver)?.intents);
    dispatcher.dispatch(&service.re_request(id, "U01")?.intents);

    let decided = service.decide(id, Decision::Approve, &approver)?;
    dispatcher.dispatch(&decided.intents);
    println!("{}", decided.summary());

    for line in service.history(id)?.view_history() {
        println!("{line}");
    }

    Ok(())
}
