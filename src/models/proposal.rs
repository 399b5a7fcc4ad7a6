// cohort-service/src/models/proposal.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::Team;

// Status of a team proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentOutcome {
    Accept,
    Decline,
}

// Per-member view of a proposal's consent state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberResponse {
    Pending,
    Accepted,
    Declined,
    // Token released without an answer (proposal died first)
    Released,
}

/// A request to form a team, awaiting unanimous consent of its members.
///
/// `tokens` holds the SHA-256 digest of every member's still unconsumed
/// response token. Consuming a token removes its entry and records the
/// answer in `accepted` or `declined`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeamProposal {
    pub id: String,
    pub course_id: String,
    pub team_name: String,
    pub creator_id: String,
    pub members: BTreeSet<String>,
    pub status: ProposalStatus,
    pub status_desc: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub accepted: BTreeSet<String>,
    #[serde(default)]
    pub declined: BTreeSet<String>,
    #[serde(default)]
    pub team_id: Option<String>,
}

impl TeamProposal {
    pub fn new(
        course_id: String,
        team_name: String,
        creator_id: String,
        token_digests: BTreeMap<String, String>,
        now: DateTime<Utc>,
        expiry_window: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            course_id,
            team_name,
            creator_id,
            members: token_digests.keys().cloned().collect(),
            status: ProposalStatus::Pending,
            status_desc: "Still no student has accepted the proposal".to_string(),
            created_at: now,
            expires_at: now + expiry_window,
            tokens: token_digests,
            accepted: BTreeSet::new(),
            declined: BTreeSet::new(),
            team_id: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn has_member(&self, student_id: &str) -> bool {
        self.members.contains(student_id)
    }

    pub fn shares_member_with(&self, roster: &BTreeSet<String>) -> bool {
        !self.members.is_disjoint(roster)
    }

    // Every member consumed their token with an accept
    pub fn all_accepted(&self) -> bool {
        self.tokens.is_empty() && self.declined.is_empty() && self.accepted == self.members
    }

    pub fn member_response(&self, student_id: &str) -> Option<MemberResponse> {
        if !self.has_member(student_id) {
            return None;
        }
        Some(if self.accepted.contains(student_id) {
            MemberResponse::Accepted
        } else if self.declined.contains(student_id) {
            MemberResponse::Declined
        } else if self.tokens.contains_key(student_id) {
            MemberResponse::Pending
        } else {
            MemberResponse::Released
        })
    }

    // Force the proposal dead, releasing any unconsumed token
    pub(crate) fn reject(&mut self, reason: &str) {
        self.status = ProposalStatus::Rejected;
        self.status_desc = reason.to_string();
        self.tokens.clear();
    }

    pub fn summary(&self) -> ProposalSummary {
        ProposalSummary {
            id: self.id.clone(),
            course_id: self.course_id.clone(),
            team_name: self.team_name.clone(),
            creator_id: self.creator_id.clone(),
            members: self.members.iter().cloned().collect(),
            status: self.status,
            status_desc: self.status_desc.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            awaiting: self.tokens.keys().cloned().collect(),
            team_id: self.team_id.clone(),
        }
    }
}

// Outward representation; token digests never leave the service
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProposalSummary {
    pub id: String,
    pub course_id: String,
    pub team_name: String,
    pub creator_id: String,
    pub members: Vec<String>,
    pub status: ProposalStatus,
    pub status_desc: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub awaiting: Vec<String>,
    pub team_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProposalMember {
    pub student_id: String,
    pub response: MemberResponse,
}

// Request to create a new proposal
#[derive(Serialize, Deserialize, Debug)]
pub struct CreateProposalRequest {
    pub team_name: String,
    pub member_ids: Vec<String>,
}

// Result of a single member response
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RespondOutcome {
    // Accepted, other members still have to answer
    Accepted { proposal_id: String, awaiting: Vec<String> },
    // Last accept; the team now exists
    TeamFormed { proposal_id: String, team: Team },
    // Last accept, but the proposal was invalidated before it could finalize
    Invalidated { proposal_id: String, reason: String },
    Declined { proposal_id: String },
    // Decline re-delivered for a proposal that is already resolved
    AlreadyResolved { proposal_id: String, status: ProposalStatus },
}
