//! Service layer API for leave workflow operations
//!
//! Every mutation runs as a single sled transaction over the trees it
//! touches and re-checks its guard inside that transaction, so concurrent
//! callers are serialised per key by sled's optimistic retry. Notification
//! intents are built only after the transaction has committed.
use super::advisory::{IdentityLookup, OverlapAdvisor, OverlapItem, PendingOverlaps, TaskSource};
use super::calendar;
use super::catalog::LeaveCatalog;
use super::config::{DiscussionScope, WorkflowConfig};
use super::context::{ProcessState, RequestContext, TRAILS_TREE, Witness, WitnessType};
use super::error::{ErrorKind, InputError, LeaveError, StateConflict, abort};
use super::leave::{
    Day, Decision, LeaveApplication, LeaveRequest, LeaveStatus, LeaveType, Period, TimeStamp,
};
use super::ledger::{self, BalanceLedger};
use super::notify::{Intent, IntentKind, NotificationPayload};
use super::policy;
use super::utils::{
    away_key, day_key, pair_key, pending_key, pending_prefix, request_id_suffix, request_key,
};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const REQUESTS_TREE: &str = "requests";
pub const DISCUSSION_TREE: &str = "discussion";
// secondary indexes over `requests`, keys only
pub const PENDING_TREE: &str = "pending_by_pair";
pub const AWAY_TREE: &str = "approved_by_end";

pub struct LeaveService {
    instance: Arc<sled::Db>,
    config: WorkflowConfig,
    catalog: LeaveCatalog,
    ledger: BalanceLedger,
    requests: sled::Tree,
    discussion: sled::Tree,
    trails: sled::Tree,
    pending: sled::Tree,
    away: sled::Tree,
    advisor: Option<OverlapAdvisor>,
}

/// A committed transition and the notifications it calls for.
#[derive(Debug, Clone)]
pub struct Transition {
    pub request: LeaveRequest,
    pub state: ProcessState,
    pub balance: u32, // remaining after the transition
    pub intents: Vec<Intent>,
}

impl Transition {
    pub fn days(&self) -> u32 {
        self.request.days()
    }

    pub fn summary(&self) -> String {
        let request = &self.request;
        let mut text = format!(
            "{} day(s) of {} for {}",
            request.days(),
            request.leave_type,
            request.period
        );
        if !request.chargeable.excluded.is_empty() {
            let weekends: Vec<String> = request
                .chargeable
                .excluded
                .iter()
                .map(Day::to_string)
                .collect();
            text.push_str(&format!(" (weekend excluded: {})", weekends.join(", ")));
        }
        text.push_str(&format!(", {} day(s) remaining", self.balance));
        text
    }
}

impl LeaveService {
    pub fn new(instance: Arc<sled::Db>, config: WorkflowConfig) -> Result<Self, LeaveError> {
        let catalog = LeaveCatalog::open(&instance)?;
        let ledger = BalanceLedger::open(&instance, catalog.clone())?;

        Ok(Self {
            requests: instance.open_tree(REQUESTS_TREE)?,
            discussion: instance.open_tree(DISCUSSION_TREE)?,
            trails: instance.open_tree(TRAILS_TREE)?,
            pending: instance.open_tree(PENDING_TREE)?,
            away: instance.open_tree(AWAY_TREE)?,
            catalog,
            ledger,
            config,
            advisor: None,
            instance,
        })
    }

    /// Open the database at `config.db_path`.
    pub fn open(config: WorkflowConfig) -> Result<Self, LeaveError> {
        let db = sled::open(&config.db_path)?;
        Self::new(Arc::new(db), config)
    }

    pub fn with_advisor(mut self, advisor: OverlapAdvisor) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Attach a task source, bounded by the configured advisory timeout.
    pub fn with_task_source(
        self,
        source: Arc<dyn TaskSource>,
        identities: Arc<dyn IdentityLookup>,
    ) -> Self {
        let timeout = self.config.advisory_timeout;
        self.with_advisor(OverlapAdvisor::new(source, identities, timeout))
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    pub fn register_leave_type(&self, leave_type: &LeaveType) -> Result<(), LeaveError> {
        self.catalog.register(leave_type)
    }

    /// Register whichever of `types` are not in the catalogue yet.
    pub fn install_leave_types(&self, types: &[LeaveType]) -> Result<usize, LeaveError> {
        let mut installed = 0;
        for leave_type in types {
            if !self.catalog.contains(&leave_type.name)? {
                self.catalog.register(leave_type)?;
                installed += 1;
            }
        }
        Ok(installed)
    }

    pub fn leave_types(&self) -> Result<Vec<LeaveType>, LeaveError> {
        self.catalog.list()
    }

    pub fn balance_of(&self, subject: &str, leave_type: &str) -> Result<u32, LeaveError> {
        self.ledger.balance_of(subject, leave_type)
    }

    /// Submit a new leave request for approval
    pub fn submit(&self, application: LeaveApplication, today: Day) -> Result<Transition, LeaveError> {
        log_outcome("submit", self.try_submit(application, today))
    }

    /// Approve or decline a request that is still pending
    pub fn decide(
        &self,
        request_id: u64,
        decision: Decision,
        decider: &str,
    ) -> Result<Transition, LeaveError> {
        log_outcome("decide", self.try_decide(request_id, decision, decider))
    }

    /// Put a pending request under discussion and open the subject's re-request gate
    pub fn discuss(&self, request_id: u64, decider: &str) -> Result<Transition, LeaveError> {
        log_outcome("discuss", self.try_discuss(request_id, decider))
    }

    /// Send a discussed request back to the approver unchanged
    pub fn re_request(&self, request_id: u64, subject: &str) -> Result<Transition, LeaveError> {
        log_outcome("re_request", self.try_re_request(request_id, subject))
    }

    fn try_submit(&self, application: LeaveApplication, today: Day) -> Result<Transition, LeaveError> {
        let application = application.finalise()?;
        let leave_type = self.catalog.get(&application.leave_type)?;

        policy::validate(&leave_type, application.start, application.end, today)?;

        let period = Period::new(application.start, application.end)?;
        let chargeable = calendar::chargeable_days_in(&period);
        if chargeable.count == 0 {
            return Err(InputError::NoChargeableDays {
                start: period.start(),
                end: period.end(),
            }
            .into());
        }

        let remaining = self.ledger.balance_of(&application.subject, &leave_type.name)?;
        if chargeable.count > remaining {
            return Err(LeaveError::InsufficientBalance { remaining });
        }

        // runs alongside the commit below
        let advisory = self.begin_advisory(&application.subject, period);

        let request = LeaveRequest {
            id: self.instance.generate_id()?,
            subject: application.subject,
            leave_type: leave_type.name.clone(),
            period,
            status: LeaveStatus::Pending,
            created: TimeStamp::new(),
            chargeable,
            proof_note: application.proof_note,
            decided_by: None,
        };
        let encoded = minicbor::to_vec(&request)?;
        let seed = leave_type.max_days;

        let (balance, ctx) = (self.ledger.tree(), &self.requests, &self.trails, &self.pending).transaction(
            |(balances, requests, trails, pending)| -> ConflictableTransactionResult<(u32, RequestContext), LeaveError> {
                // re-checked here, a concurrent approval may have spent the balance
                let remaining =
                    ledger::balance_in(balances, &request.subject, &request.leave_type, seed)?;
                if request.chargeable.count > remaining {
                    return Err(abort(LeaveError::InsufficientBalance { remaining }));
                }

                requests.insert(&request_key(request.id)[..], encoded.as_slice())?;
                pending.insert(
                    pending_key(&request.subject, &request.leave_type, request.id),
                    &[] as &[u8],
                )?;
                let ctx = RequestContext::append_in(
                    trails,
                    Witness::new(
                        request.id,
                        &request.subject,
                        TimeStamp::new(),
                        WitnessType::Submit {
                            leave_type: request.leave_type.clone(),
                            days: request.chargeable.count,
                        },
                    ),
                )?;
                Ok((remaining, ctx))
            },
        )?;

        tracing::info!(
            request_id = request.id,
            subject = %request.subject,
            leave_type = %request.leave_type,
            days = request.days(),
            excluded = request.chargeable.excluded.len(),
            balance,
            "leave request submitted"
        );

        let advisory: Vec<OverlapItem> = advisory.wait().collect();
        let payload = self.payload(&request, balance, advisory);
        let intents = vec![
            Intent::new(
                IntentKind::NotifyApprover { reissued: false },
                &self.config.approver_id,
                payload.clone(),
            ),
            Intent::new(IntentKind::NotifySubject, &request.subject, payload),
        ];

        Ok(Transition {
            state: ctx.current_state(),
            request,
            balance,
            intents,
        })
    }

    fn try_decide(
        &self,
        request_id: u64,
        decision: Decision,
        decider: &str,
    ) -> Result<Transition, LeaveError> {
        let existing = self.request(request_id)?;
        let seed = self.ledger.seed_for(&existing.leave_type)?;
        // a subject wide gate outlives the request, a per-request one does not
        let closed_gate = match self.config.discussion_scope {
            DiscussionScope::Subject => None,
            DiscussionScope::Request => Some(self.discussion_key(&existing.subject, request_id)),
        };

        let trees = (
            &self.requests,
            self.ledger.tree(),
            &self.trails,
            &self.discussion,
            &self.pending,
            &self.away,
        );
        let (request, balance, ctx) = trees.transaction(
            |(requests, balances, trails, discussion, pending, away)| -> ConflictableTransactionResult<(LeaveRequest, u32, RequestContext), LeaveError> {
                let mut request = load_request_in(requests, request_id)?;
                if request.status.is_terminal() {
                    return Err(abort(StateConflict::AlreadyDecided {
                        request_id,
                        status: request.status,
                    }));
                }

                request.status = decision.status();
                request.decided_by = Some(decider.to_string());

                // the debit commits together with the status change or not at all
                let balance = match decision {
                    Decision::Approve => ledger::debit_in(
                        balances,
                        &request.subject,
                        &request.leave_type,
                        seed,
                        request.chargeable.count,
                    )?,
                    Decision::Decline => {
                        ledger::balance_in(balances, &request.subject, &request.leave_type, seed)?
                    }
                };
                save_request_in(requests, &request)?;

                pending.remove(pending_key(&request.subject, &request.leave_type, request_id))?;
                if decision == Decision::Approve {
                    away.insert(away_key(request.period.end(), request_id), &[] as &[u8])?;
                }
                if let Some(gate) = &closed_gate {
                    discussion.remove(gate.as_slice())?;
                }

                let witness_type = match decision {
                    Decision::Approve => WitnessType::Approve {
                        days: request.chargeable.count,
                    },
                    Decision::Decline => WitnessType::Decline,
                };
                let ctx = RequestContext::append_in(
                    trails,
                    Witness::new(request_id, decider, TimeStamp::new(), witness_type),
                )?;
                Ok((request, balance, ctx))
            },
        )?;

        tracing::info!(
            request_id,
            subject = %request.subject,
            leave_type = %request.leave_type,
            status = %request.status,
            decider,
            days = request.days(),
            balance,
            "leave request decided"
        );

        let payload = self.payload(&request, balance, Vec::new());
        let intents = vec![
            Intent::new(
                IntentKind::UpdateApproverMessage,
                &self.config.approver_id,
                payload.clone(),
            ),
            Intent::new(IntentKind::NotifySubject, &request.subject, payload.clone()),
            Intent::new(
                IntentKind::NotifyOversight,
                &self.config.oversight_channel,
                payload,
            ),
        ];

        Ok(Transition {
            state: ctx.current_state(),
            request,
            balance,
            intents,
        })
    }

    fn try_discuss(&self, request_id: u64, decider: &str) -> Result<Transition, LeaveError> {
        let existing = self.request(request_id)?;
        let seed = self.ledger.seed_for(&existing.leave_type)?;
        let gate = self.discussion_key(&existing.subject, request_id);

        let (request, balance, ctx) = (&self.requests, &self.discussion, self.ledger.tree(), &self.trails)
            .transaction(
                |(requests, discussion, balances, trails)| -> ConflictableTransactionResult<(LeaveRequest, u32, RequestContext), LeaveError> {
                    let request = load_request_in(requests, request_id)?;
                    if request.status.is_terminal() {
                        return Err(abort(StateConflict::AlreadyDecided {
                            request_id,
                            status: request.status,
                        }));
                    }

                    discussion.insert(gate.as_slice(), &[1u8][..])?;
                    let balance =
                        ledger::balance_in(balances, &request.subject, &request.leave_type, seed)?;
                    let ctx = RequestContext::append_in(
                        trails,
                        Witness::new(request_id, decider, TimeStamp::new(), WitnessType::Discuss),
                    )?;
                    Ok((request, balance, ctx))
                },
            )?;

        tracing::info!(
            request_id,
            subject = %request.subject,
            decider,
            rounds = ctx.discussion_rounds(),
            "leave request under discussion"
        );

        let mut payload = self.payload(&request, balance, Vec::new());
        payload.decider = Some(decider.to_string());
        payload.under_discussion = true;
        let intents = vec![
            Intent::new(
                IntentKind::NotifyDiscussionRequested,
                &request.subject,
                payload.clone(),
            ),
            Intent::new(
                IntentKind::UpdateApproverMessage,
                &self.config.approver_id,
                payload,
            ),
        ];

        Ok(Transition {
            state: ctx.current_state(),
            request,
            balance,
            intents,
        })
    }

    fn try_re_request(&self, request_id: u64, subject: &str) -> Result<Transition, LeaveError> {
        let existing = self.request(request_id)?;
        if existing.subject != subject {
            return Err(StateConflict::NotRequester {
                request_id,
                subject: subject.to_string(),
            }
            .into());
        }
        let seed = self.ledger.seed_for(&existing.leave_type)?;
        let gate = self.discussion_key(subject, request_id);

        let (request, balance, ctx) = (&self.requests, &self.discussion, self.ledger.tree(), &self.trails)
            .transaction(
                |(requests, discussion, balances, trails)| -> ConflictableTransactionResult<(LeaveRequest, u32, RequestContext), LeaveError> {
                    let request = load_request_in(requests, request_id)?;
                    if discussion.get(gate.as_slice())?.is_none() {
                        return Err(abort(StateConflict::DiscussionRequired {
                            subject: subject.to_string(),
                        }));
                    }
                    if request.status.is_terminal() {
                        return Err(abort(StateConflict::AlreadyDecided {
                            request_id,
                            status: request.status,
                        }));
                    }

                    discussion.remove(gate.as_slice())?;
                    let balance =
                        ledger::balance_in(balances, &request.subject, &request.leave_type, seed)?;
                    let ctx = RequestContext::append_in(
                        trails,
                        Witness::new(request_id, subject, TimeStamp::new(), WitnessType::ReRequest),
                    )?;
                    Ok((request, balance, ctx))
                },
            )?;

        tracing::info!(
            request_id,
            subject,
            days = request.days(),
            "leave re-requested after discussion"
        );

        // same chargeable figure as the original submission, nothing is re-validated
        let payload = self.payload(&request, balance, Vec::new());
        let intents = vec![Intent::new(
            IntentKind::NotifyApprover { reissued: true },
            &self.config.approver_id,
            payload,
        )];

        Ok(Transition {
            state: ctx.current_state(),
            request,
            balance,
            intents,
        })
    }

    pub fn request(&self, request_id: u64) -> Result<LeaveRequest, LeaveError> {
        let bytes = self
            .requests
            .get(request_key(request_id))?
            .ok_or(LeaveError::RequestNotFound(request_id))?;
        Ok(minicbor::decode(&bytes)?)
    }

    /// Decision trail of a request, oldest witness first.
    pub fn history(&self, request_id: u64) -> Result<RequestContext, LeaveError> {
        self.request(request_id)?;
        RequestContext::load(&self.trails, request_id)
    }

    /// Whether `subject` may currently re-request `request_id`.
    pub fn discussion_open(&self, subject: &str, request_id: u64) -> Result<bool, LeaveError> {
        Ok(self
            .discussion
            .contains_key(self.discussion_key(subject, request_id))?)
    }

    /// Latest request still waiting on a decision for the pair.
    pub fn pending_for(
        &self,
        subject: &str,
        leave_type: &str,
    ) -> Result<Option<LeaveRequest>, LeaveError> {
        match self.pending.scan_prefix(pending_prefix(subject, leave_type)).keys().next_back() {
            Some(key) => Ok(Some(self.indexed_request(&key?)?)),
            None => Ok(None),
        }
    }

    /// Who is away on each day of `period`, from approved requests only.
    ///
    /// Every day of the period is present, with an empty list when nobody is away.
    pub fn list_away_on(&self, period: Period) -> Result<BTreeMap<Day, Vec<String>>, LeaveError> {
        let mut roster: BTreeMap<Day, Vec<String>> =
            period.days().map(|day| (day, Vec::new())).collect();

        // everything ending on or after the first day, starts are checked per request
        for key in self.away.range(day_key(period.start()).to_vec()..).keys() {
            let request = self.indexed_request(&key?)?;
            if request.status != LeaveStatus::Approved || !request.period.overlaps(&period) {
                continue;
            }
            for day in request.period.days().filter(|day| period.contains(*day)) {
                roster.entry(day).or_default().push(request.subject.clone());
            }
        }

        for subjects in roster.values_mut() {
            subjects.sort();
            subjects.dedup();
        }
        Ok(roster)
    }

    fn indexed_request(&self, key: &[u8]) -> Result<LeaveRequest, LeaveError> {
        let request_id = request_id_suffix(key).ok_or(LeaveError::CorruptRecord("index"))?;
        self.request(request_id)
    }

    fn begin_advisory(&self, subject: &str, period: Period) -> PendingOverlaps {
        match &self.advisor {
            Some(advisor) => advisor.begin(subject, period),
            None => PendingOverlaps::empty(),
        }
    }

    fn discussion_key(&self, subject: &str, request_id: u64) -> Vec<u8> {
        match self.config.discussion_scope {
            DiscussionScope::Subject => pair_key(subject, "*"),
            DiscussionScope::Request => pair_key(subject, &request_id.to_string()),
        }
    }

    fn payload(
        &self,
        request: &LeaveRequest,
        balance: u32,
        advisory: Vec<OverlapItem>,
    ) -> NotificationPayload {
        NotificationPayload {
            request_id: request.id,
            subject: request.subject.clone(),
            leave_type: request.leave_type.clone(),
            period: request.period,
            days: request.chargeable.count,
            excluded: request.chargeable.excluded.clone(),
            balance,
            decision: match request.status {
                LeaveStatus::Pending => None,
                LeaveStatus::Approved => Some(Decision::Approve),
                LeaveStatus::Declined => Some(Decision::Decline),
            },
            decider: request.decided_by.clone(),
            proof_note: request.proof_note.clone(),
            advisory,
            under_discussion: false,
        }
    }
}

fn load_request_in(
    requests: &TransactionalTree,
    request_id: u64,
) -> ConflictableTransactionResult<LeaveRequest, LeaveError> {
    let bytes = requests
        .get(&request_key(request_id)[..])?
        .ok_or_else(|| abort(LeaveError::RequestNotFound(request_id)))?;
    minicbor::decode(&bytes).map_err(abort)
}

fn save_request_in(
    requests: &TransactionalTree,
    request: &LeaveRequest,
) -> ConflictableTransactionResult<(), LeaveError> {
    let encoded = minicbor::to_vec(request).map_err(abort)?;
    requests.insert(&request_key(request.id)[..], encoded)?;
    Ok(())
}

fn log_outcome<T>(operation: &'static str, result: Result<T, LeaveError>) -> Result<T, LeaveError> {
    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::Storage => {
                tracing::error!(operation, code = e.code(), error = %e, "workflow operation failed")
            }
            _ => tracing::debug!(operation, code = e.code(), reason = %e, "workflow operation rejected"),
        }
    }
    result
}
