// cohort-service/src/utils/proposal_storage.rs
use crate::models::{ConsentOutcome, ProposalStatus, ServiceError, TeamProposal};
use crate::utils::json_storage;
use log::{debug, error, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

// Outcome of a conditional token consumption
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeResult {
    Consumed(TeamProposal),
    // Proposal is no longer pending; nothing changed
    NotPending(TeamProposal),
    // Member already answered; nothing changed
    AlreadyConsumed(TeamProposal),
    // No such proposal, member or token
    Unknown,
}

/// Durable proposal state. Implementations carry no business rules; they
/// only guarantee that `update` is an atomic read-modify-write, which the
/// conditional operations below rely on.
pub trait ProposalStore: Send + Sync {
    fn insert(&self, proposal: &TeamProposal) -> Result<(), ServiceError>;

    fn find(&self, id: &str) -> Result<Option<TeamProposal>, ServiceError>;

    fn delete(&self, id: &str) -> Result<bool, ServiceError>;

    fn list(&self) -> Result<Vec<TeamProposal>, ServiceError>;

    /// Apply `f` to the stored record atomically. The record is written back
    /// only when `f` returns true. Returns the record as it stands afterwards.
    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut TeamProposal) -> bool,
    ) -> Result<Option<TeamProposal>, ServiceError>;

    fn list_for_course(&self, course_id: &str) -> Result<Vec<TeamProposal>, ServiceError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|p| p.course_id == course_id)
            .collect())
    }

    fn list_for_student(&self, student_id: &str) -> Result<Vec<TeamProposal>, ServiceError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|p| p.has_member(student_id))
            .collect())
    }

    // (proposal id, member) holding an unconsumed token with this digest
    fn find_by_token_digest(&self, token_digest: &str) -> Result<Option<(String, String)>, ServiceError> {
        Ok(self.list()?.into_iter().find_map(|p| {
            p.tokens
                .iter()
                .find(|(_, digest)| digest.as_str() == token_digest)
                .map(|(member, _)| (p.id.clone(), member.clone()))
        }))
    }

    // Consume `member`'s token only if the proposal is still pending and the
    // digest matches the unconsumed token
    fn consume_token(
        &self,
        id: &str,
        member: &str,
        token_digest: &str,
        outcome: ConsentOutcome,
    ) -> Result<ConsumeResult, ServiceError> {
        #[derive(PartialEq)]
        enum Seen {
            Consumed,
            NotPending,
            AlreadyConsumed,
            Unknown,
        }
        let mut seen = Seen::Unknown;

        let record = self.update(id, &mut |proposal| {
            if !proposal.has_member(member) {
                seen = Seen::Unknown;
                return false;
            }
            if !proposal.is_pending() {
                seen = Seen::NotPending;
                return false;
            }
            match proposal.tokens.get(member) {
                Some(stored) if stored == token_digest => {
                    proposal.tokens.remove(member);
                    match outcome {
                        ConsentOutcome::Accept => proposal.accepted.insert(member.to_string()),
                        ConsentOutcome::Decline => proposal.declined.insert(member.to_string()),
                    };
                    seen = Seen::Consumed;
                    true
                }
                Some(_) => {
                    seen = Seen::Unknown;
                    false
                }
                None => {
                    seen = Seen::AlreadyConsumed;
                    false
                }
            }
        })?;

        Ok(match (record, seen) {
            (Some(p), Seen::Consumed) => ConsumeResult::Consumed(p),
            (Some(p), Seen::NotPending) => ConsumeResult::NotPending(p),
            (Some(p), Seen::AlreadyConsumed) => ConsumeResult::AlreadyConsumed(p),
            _ => ConsumeResult::Unknown,
        })
    }

    // Move `from` -> `to`; returns the updated record only if the move happened
    fn transition(
        &self,
        id: &str,
        from: ProposalStatus,
        to: ProposalStatus,
        reason: &str,
    ) -> Result<Option<TeamProposal>, ServiceError> {
        let mut moved = false;
        let record = self.update(id, &mut |proposal| {
            if proposal.status != from {
                return false;
            }
            match to {
                ProposalStatus::Rejected => proposal.reject(reason),
                other => {
                    proposal.status = other;
                    proposal.status_desc = reason.to_string();
                }
            }
            moved = true;
            true
        })?;

        Ok(record.filter(|_| moved))
    }
}

// Volatile store, used by tests and single-process deployments
#[derive(Default)]
pub struct MemoryProposalStore {
    proposals: Mutex<HashMap<String, TeamProposal>>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, TeamProposal>>, ServiceError> {
        self.proposals.lock().map_err(|e| {
            error!("Proposal store lock poisoned: {:?}", e);
            ServiceError::InternalServerError
        })
    }
}

impl ProposalStore for MemoryProposalStore {
    fn insert(&self, proposal: &TeamProposal) -> Result<(), ServiceError> {
        self.guard()?.insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<TeamProposal>, ServiceError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        Ok(self.guard()?.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<TeamProposal>, ServiceError> {
        Ok(self.guard()?.values().cloned().collect())
    }

    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut TeamProposal) -> bool,
    ) -> Result<Option<TeamProposal>, ServiceError> {
        let mut proposals = self.guard()?;
        Ok(proposals.get_mut(id).map(|proposal| {
            let mut working = proposal.clone();
            if f(&mut working) {
                *proposal = working;
            }
            proposal.clone()
        }))
    }
}

/// One `<id>.json` per proposal under `<root>/proposals`. Writers inside the
/// process are serialized so `update` stays a compare-and-swap.
pub struct FileProposalStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileProposalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let dir = root.into().join("proposals");
        json_storage::ensure_dir(&dir)?;
        info!("Proposal store at {}", dir.display());
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    fn write_guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, ServiceError> {
        self.write_lock.lock().map_err(|e| {
            error!("Proposal store write lock poisoned: {:?}", e);
            ServiceError::InternalServerError
        })
    }
}

impl ProposalStore for FileProposalStore {
    fn insert(&self, proposal: &TeamProposal) -> Result<(), ServiceError> {
        let _guard = self.write_guard()?;
        json_storage::save_record(&self.dir, &proposal.id, proposal)?;
        info!("✅ Saved proposal: {}", proposal.id);
        Ok(())
    }

    fn find(&self, id: &str) -> Result<Option<TeamProposal>, ServiceError> {
        json_storage::load_record(&self.dir, id)
    }

    fn delete(&self, id: &str) -> Result<bool, ServiceError> {
        let _guard = self.write_guard()?;
        let deleted = json_storage::delete_record(&self.dir, id)?;
        if deleted {
            info!("✅ Deleted proposal: {}", id);
        }
        Ok(deleted)
    }

    fn list(&self) -> Result<Vec<TeamProposal>, ServiceError> {
        json_storage::load_all(&self.dir)
    }

    fn update(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut TeamProposal) -> bool,
    ) -> Result<Option<TeamProposal>, ServiceError> {
        let _guard = self.write_guard()?;
        let mut proposal: TeamProposal = match json_storage::load_record(&self.dir, id)? {
            Some(proposal) => proposal,
            None => return Ok(None),
        };

        if f(&mut proposal) {
            json_storage::save_record(&self.dir, id, &proposal)?;
            debug!("Updated proposal {} ({:?})", id, proposal.status);
        }
        Ok(Some(proposal))
    }
}
