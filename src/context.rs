//! Decision trail of a leave request and the process state derived from it
use super::error::{LeaveError, abort};
use super::leave::TimeStamp;
use super::utils::request_key;
use chrono::Utc;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};

pub const TRAILS_TREE: &str = "trails";

/// Where a request sits in the approval loop.
///
/// `Discussing` is a process state only, the persisted request stays pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Draft,
    Pending,
    Discussing,
    Approved,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RequestContext {
    #[n(0)]
    pub request_id: u64,
    #[n(1)]
    pub witness_set: Vec<Witness>,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Witness {
    #[n(0)]
    pub request_id: u64,
    #[n(1)]
    pub actor: String, // subject or decider that caused the transition
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub witness_type: WitnessType,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum WitnessType {
    #[n(0)]
    Submit {
        #[n(0)]
        leave_type: String,
        #[n(1)]
        days: u32,
    },
    #[n(1)]
    Discuss,
    #[n(2)]
    ReRequest,
    #[n(3)]
    Approve {
        #[n(0)]
        days: u32,
    },
    #[n(4)]
    Decline,
}

impl ProcessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessState::Approved | ProcessState::Declined)
    }

    // Witnesses that make no sense from the current state leave it unchanged.
    fn apply(self, witness: &WitnessType) -> Self {
        use ProcessState::*;
        match (self, witness) {
            (Draft, WitnessType::Submit { .. }) => Pending,
            (Draft, _) => Draft,
            (Approved, _) | (Declined, _) => self,
            (Pending | Discussing, WitnessType::Discuss) => Discussing,
            (Pending | Discussing, WitnessType::ReRequest) => Pending,
            (Pending | Discussing, WitnessType::Approve { .. }) => Approved,
            (Pending | Discussing, WitnessType::Decline) => Declined,
            (Pending | Discussing, WitnessType::Submit { .. }) => self,
        }
    }
}

impl Witness {
    pub fn new(
        request_id: u64,
        actor: &str,
        timestamp: TimeStamp<Utc>,
        witness_type: WitnessType,
    ) -> Self {
        Self {
            request_id,
            actor: actor.to_string(),
            timestamp,
            witness_type,
        }
    }
    /// CBOR encoding of the witness and the sha256 digest of that encoding.
    pub fn build(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
    pub fn label(&self) -> &'static str {
        match self.witness_type {
            WitnessType::Submit { .. } => "submit",
            WitnessType::Discuss => "discuss",
            WitnessType::ReRequest => "re-request",
            WitnessType::Approve { .. } => "approve",
            WitnessType::Decline => "decline",
        }
    }
}

impl RequestContext {
    pub fn new(request_id: u64) -> Self {
        Self {
            request_id,
            witness_set: vec![],
        }
    }
    pub fn insert_witness(&mut self, witness: Witness) {
        self.witness_set.push(witness);
    }
    pub fn current_state(&self) -> ProcessState {
        self.witness_set
            .iter()
            .fold(ProcessState::Draft, |state, w| state.apply(&w.witness_type))
    }
    pub fn is_under_discussion(&self) -> bool {
        self.current_state() == ProcessState::Discussing
    }
    /// Number of times the request went through the discuss loop.
    pub fn discussion_rounds(&self) -> usize {
        self.witness_set
            .iter()
            .filter(|w| w.witness_type == WitnessType::Discuss)
            .count()
    }
    /// One line per witness, oldest first, suffixed with a short digest.
    pub fn view_history(&self) -> Vec<String> {
        self.witness_set
            .iter()
            .map(|w| {
                let digest = w
                    .build()
                    .map(|(hash, _)| hash.chars().take(12).collect::<String>())
                    .unwrap_or_else(|_| "-".to_string());
                format!(
                    "{} {} by {} [{}]",
                    w.timestamp.to_datetime_utc().format("%Y-%m-%d %H:%M:%S"),
                    w.label(),
                    w.actor,
                    digest
                )
            })
            .collect()
    }

    pub fn load(trails: &sled::Tree, request_id: u64) -> Result<Self, LeaveError> {
        match trails.get(request_key(request_id))? {
            Some(bytes) => Ok(minicbor::decode(&bytes)?),
            None => Ok(Self::new(request_id)),
        }
    }

    pub(crate) fn load_in(
        trails: &TransactionalTree,
        request_id: u64,
    ) -> ConflictableTransactionResult<Self, LeaveError> {
        match trails.get(&request_key(request_id)[..])? {
            Some(bytes) => minicbor::decode(&bytes).map_err(abort),
            None => Ok(Self::new(request_id)),
        }
    }

    pub(crate) fn save_in(&self, trails: &TransactionalTree) -> ConflictableTransactionResult<(), LeaveError> {
        let encoded = minicbor::to_vec(self).map_err(abort)?;
        trails.insert(&request_key(self.request_id)[..], encoded)?;
        Ok(())
    }

    /// Append a witness to the stored trail within the surrounding transaction.
    pub(crate) fn append_in(
        trails: &TransactionalTree,
        witness: Witness,
    ) -> ConflictableTransactionResult<Self, LeaveError> {
        let mut ctx = Self::load_in(trails, witness.request_id)?;
        ctx.insert_witness(witness);
        ctx.save_in(trails)?;
        Ok(ctx)
    }
}
