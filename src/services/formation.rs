// cohort-service/src/services/formation.rs
//! Team formation: proposal creation, per-member consent, finalization into
//! a team, invalidation of overlapping proposals and expiry.
//!
//! All proposal status transitions of a course happen while holding that
//! course's lock. Token consumption is additionally a conditional update in
//! the proposal store, so a token is consumed at most once even if two
//! responses race past the lock-free token resolution.

use crate::models::{
    ConsentOutcome, ProposalMember, ProposalStatus, ProposalSummary, RespondOutcome,
    RosterReport, ServiceError, Student, Team, TeamProposal,
};
use crate::services::directory::Directory;
use crate::services::notification::NotificationChannel;
use crate::services::roster::{self, StudentStanding};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::course_lock::CourseLockRegistry;
use crate::utils::proposal_storage::{ConsumeResult, ProposalStore};
use crate::utils::team_storage::TeamStore;
use crate::utils::token;
use chrono::Duration;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

const EXPIRED_DESC: &str = "Proposal expired before every member answered";

#[derive(Debug, Clone)]
pub struct EngineSettings {
    // How long members have to answer
    pub expiry_window: Duration,
    // How long dead proposals are kept after expiring
    pub retention: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            expiry_window: Duration::days(3),
            retention: Duration::days(30),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub purged: usize,
    pub failures: usize,
}

pub struct TeamFormationEngine {
    directory: Arc<dyn Directory>,
    channel: Arc<dyn NotificationChannel>,
    proposals: Arc<dyn ProposalStore>,
    teams: Arc<dyn TeamStore>,
    clock: Arc<dyn Clock>,
    locks: CourseLockRegistry,
    settings: EngineSettings,
}

impl TeamFormationEngine {
    pub fn new(
        directory: Arc<dyn Directory>,
        channel: Arc<dyn NotificationChannel>,
        proposals: Arc<dyn ProposalStore>,
        teams: Arc<dyn TeamStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            directory,
            channel,
            proposals,
            teams,
            clock: Arc::new(SystemClock),
            locks: CourseLockRegistry::new(),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Attach every stored team to the directory. Run once at startup so the
    /// directory agrees with teams finalized by earlier runs.
    pub fn restore_team_index(&self) -> Result<usize, ServiceError> {
        let teams = self.teams.list()?;
        for team in &teams {
            self.directory.attach_team(team)?;
        }
        info!("📚 Restored {} teams into the directory", teams.len());
        Ok(teams.len())
    }

    // The team store is authoritative; the directory index may lag behind it
    fn is_teamed(&self, student_id: &str, course_id: &str) -> Result<bool, ServiceError> {
        Ok(self.directory.student_has_team(student_id, course_id)?
            || self.teams.find_for_student(student_id, course_id)?.is_some())
    }

    // Channel index first, then the stored digests of unconsumed tokens
    fn resolve_token(&self, response_token: &str) -> Result<Option<(String, String)>, ServiceError> {
        if let Some(resolved) = self.channel.resolve_token(response_token)? {
            return Ok(Some(resolved));
        }
        let resolved = self.proposals.find_by_token_digest(&token::digest(response_token))?;
        if resolved.is_some() {
            debug!("Response token resolved from the proposal store");
        }
        Ok(resolved)
    }

    // ----- creation -----

    /// Validate a proposal request, persist it with a fresh token per member
    /// and dispatch the tokens. Either everything happens or nothing does.
    pub fn create_proposal(
        &self,
        course_id: &str,
        team_name: &str,
        member_ids: &[String],
        creator_username: &str,
    ) -> Result<String, ServiceError> {
        info!("📝 Creating proposal '{}' in course {} for {}", team_name, course_id, creator_username);

        let course = match self.directory.course(course_id)? {
            Some(course) => course,
            None => {
                error!("❌ Course not found: {}", course_id);
                return Err(ServiceError::NotFound(format!("course '{}'", course_id)));
            }
        };
        if !course.enabled {
            error!("❌ Course not enabled: {}", course_id);
            return Err(ServiceError::CourseNotEnabled(course_id.to_string()));
        }
        self.authorize(creator_username, course_id)?;

        let team_name = team_name.trim();
        if team_name.is_empty() {
            return Err(ServiceError::BadRequest("team name must not be empty".to_string()));
        }

        self.locks.with_course(course_id, || {
            let now = self.clock.now();
            let existing = self.course_proposals(course_id, now)?;

            if existing
                .iter()
                .any(|p| p.team_name == team_name && p.status != ProposalStatus::Rejected)
                || self
                    .teams
                    .list_for_course(course_id)?
                    .iter()
                    .any(|t| t.name == team_name)
            {
                warn!("❌ Team name '{}' already taken in course {}", team_name, course_id);
                return Err(ServiceError::Conflict(format!(
                    "team '{}' already has a proposal in progress or accepted in course '{}'",
                    team_name, course_id
                )));
            }

            let creator_id = match self.directory.resolve_creator(creator_username)? {
                Some(id) => id,
                None => {
                    error!("❌ No student with username {}", creator_username);
                    return Err(ServiceError::NotFound(format!(
                        "student with username '{}'",
                        creator_username
                    )));
                }
            };

            if existing.iter().any(|p| p.is_pending() && p.creator_id == creator_id) {
                warn!("❌ Student {} already has a pending proposal in {}", creator_id, course_id);
                return Err(ServiceError::Conflict(format!(
                    "student '{}' has already proposed a team in course '{}'",
                    creator_id, course_id
                )));
            }

            let members: BTreeSet<String> = member_ids
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect();
            if members.len() < course.min_team_size || members.len() > course.max_team_size {
                warn!(
                    "❌ Team '{}' has {} members, course {} allows [{}, {}]",
                    team_name, members.len(), course_id, course.min_team_size, course.max_team_size
                );
                return Err(ServiceError::InvalidCardinality(format!(
                    "team '{}' has {} distinct members, expected between {} and {}",
                    team_name,
                    members.len(),
                    course.min_team_size,
                    course.max_team_size
                )));
            }
            if !members.contains(&creator_id) {
                return Err(ServiceError::BadRequest(format!(
                    "the proposing student '{}' must be one of the members",
                    creator_id
                )));
            }

            for member in &members {
                self.check_member_eligible(member, course_id, &existing, None)?;
            }

            let plain_tokens: BTreeMap<String, String> = members
                .iter()
                .map(|member| (member.clone(), token::new_token()))
                .collect();
            let digests = plain_tokens
                .iter()
                .map(|(member, plain)| (member.clone(), token::digest(plain)))
                .collect();

            let proposal = TeamProposal::new(
                course_id.to_string(),
                team_name.to_string(),
                creator_id,
                digests,
                now,
                self.settings.expiry_window,
            );
            self.proposals.insert(&proposal)?;

            if let Err(e) = self.channel.dispatch(&proposal.id, &plain_tokens) {
                error!("❌ Dispatch failed for proposal {}, rolling back: {}", proposal.id, e);
                if let Err(delete_err) = self.proposals.delete(&proposal.id) {
                    error!("❌ Rollback of proposal {} failed: {}", proposal.id, delete_err);
                }
                if let Err(revoke_err) = self.channel.revoke(&proposal.id) {
                    warn!("Could not revoke tokens of {}: {}", proposal.id, revoke_err);
                }
                return Err(match e {
                    ServiceError::DispatchFailure(_) => e,
                    other => ServiceError::DispatchFailure(other.to_string()),
                });
            }

            info!("✅ Proposal created: {} ({} members)", proposal.id, proposal.members.len());
            Ok(proposal.id)
        })
    }

    // Rule shared by creation and accept: enrolled, not teamed, not committed
    fn check_member_eligible(
        &self,
        member: &str,
        course_id: &str,
        course_proposals: &[TeamProposal],
        except_proposal: Option<&str>,
    ) -> Result<(), ServiceError> {
        let standing = StudentStanding::lookup(self.directory.as_ref(), member, course_id)?;
        if !standing.exists {
            error!("❌ Student not found: {}", member);
            return Err(ServiceError::NotFound(format!("student '{}'", member)));
        }
        if !standing.enrolled {
            error!("❌ Student {} not enrolled in {}", member, course_id);
            return Err(ServiceError::Conflict(format!(
                "student '{}' is not enrolled in course '{}'",
                member, course_id
            )));
        }
        if self.is_teamed(member, course_id)? {
            warn!("❌ Student {} already on a team in {}", member, course_id);
            return Err(ServiceError::Conflict(format!(
                "student '{}' is already part of a team in course '{}'",
                member, course_id
            )));
        }
        if committed_elsewhere(course_proposals, member, except_proposal) {
            warn!("❌ Student {} already accepted another proposal in {}", member, course_id);
            return Err(ServiceError::Conflict(format!(
                "student '{}' has already accepted a team proposal in course '{}'",
                member, course_id
            )));
        }
        Ok(())
    }

    // ----- responses -----

    /// Apply one member's answer, identified by their response token.
    pub fn respond(&self, response_token: &str, outcome: ConsentOutcome) -> Result<RespondOutcome, ServiceError> {
        let (proposal_id, student_id) = match self.resolve_token(response_token)? {
            Some(resolved) => resolved,
            None => {
                warn!("❌ Unknown response token");
                return Err(ServiceError::token_not_found());
            }
        };
        let course_id = match self.proposals.find(&proposal_id)? {
            Some(proposal) => proposal.course_id,
            None => {
                warn!("❌ Token points at missing proposal {}", proposal_id);
                return Err(ServiceError::token_not_found());
            }
        };

        info!("🔄 {:?} from {} on proposal {}", outcome, student_id, proposal_id);

        self.locks.with_course(&course_id, || {
            self.respond_locked(&proposal_id, &student_id, response_token, outcome)
        })
    }

    fn respond_locked(
        &self,
        proposal_id: &str,
        student_id: &str,
        response_token: &str,
        outcome: ConsentOutcome,
    ) -> Result<RespondOutcome, ServiceError> {
        let now = self.clock.now();
        let proposal = match self.proposals.find(proposal_id)? {
            Some(proposal) => self.refresh(proposal, now)?,
            None => return Err(ServiceError::token_not_found()),
        };
        if !proposal.is_pending() {
            return stale_response(proposal, outcome);
        }

        if outcome == ConsentOutcome::Accept {
            let course_proposals = self.course_proposals(&proposal.course_id, now)?;
            if committed_elsewhere(&course_proposals, student_id, Some(proposal_id)) {
                warn!("❌ Student {} already accepted another proposal", student_id);
                return Err(ServiceError::Conflict(format!(
                    "student '{}' has already accepted a team proposal in course '{}'",
                    student_id, proposal.course_id
                )));
            }
        }

        match self.proposals.consume_token(
            proposal_id,
            student_id,
            &token::digest(response_token),
            outcome,
        )? {
            ConsumeResult::Unknown => Err(ServiceError::token_not_found()),
            ConsumeResult::NotPending(proposal) => stale_response(proposal, outcome),
            ConsumeResult::AlreadyConsumed(proposal) => Err(ServiceError::StaleProposal(format!(
                "student '{}' already answered proposal {}",
                student_id, proposal.id
            ))),
            ConsumeResult::Consumed(proposal) => match outcome {
                ConsentOutcome::Decline => {
                    self.proposals.transition(
                        proposal_id,
                        ProposalStatus::Pending,
                        ProposalStatus::Rejected,
                        &format!("Declined by {}", student_id),
                    )?;
                    info!("✅ Proposal {} rejected: {} declined", proposal_id, student_id);
                    Ok(RespondOutcome::Declined { proposal_id: proposal_id.to_string() })
                }
                ConsentOutcome::Accept if proposal.all_accepted() => self.finalize(proposal, now),
                ConsentOutcome::Accept => {
                    debug!("Proposal {} still waiting on {:?}", proposal_id, proposal.tokens.keys());
                    Ok(RespondOutcome::Accepted {
                        proposal_id: proposal_id.to_string(),
                        awaiting: proposal.tokens.keys().cloned().collect(),
                    })
                }
            },
        }
    }

    // ----- finalization -----

    // Caller holds the course lock
    fn finalize(&self, proposal: TeamProposal, now: chrono::DateTime<chrono::Utc>) -> Result<RespondOutcome, ServiceError> {
        let invalidated = |reason: String| -> Result<RespondOutcome, ServiceError> {
            self.proposals.transition(
                &proposal.id,
                ProposalStatus::Pending,
                ProposalStatus::Rejected,
                &reason,
            )?;
            warn!("Proposal {} invalidated at finalization: {}", proposal.id, reason);
            Ok(RespondOutcome::Invalidated { proposal_id: proposal.id.clone(), reason })
        };

        if proposal.is_expired(now) {
            return invalidated(EXPIRED_DESC.to_string());
        }
        for member in &proposal.members {
            if self.is_teamed(member, &proposal.course_id)? {
                return invalidated(format!("Member {} already joined another team", member));
            }
        }

        let team = Team {
            id: Uuid::new_v4().to_string(),
            course_id: proposal.course_id.clone(),
            name: proposal.team_name.clone(),
            members: proposal.members.clone(),
            proposal_id: Some(proposal.id.clone()),
            created_at: now,
        };
        self.teams.insert(&team)?;

        let team_id = team.id.clone();
        let stored = self.proposals.update(&proposal.id, &mut |record| {
            if !record.is_pending() || !record.all_accepted() {
                return false;
            }
            record.status = ProposalStatus::Accepted;
            record.status_desc = "Every member accepted, team formed".to_string();
            record.team_id = Some(team_id.clone());
            true
        })?;

        match stored {
            Some(record) if record.status == ProposalStatus::Accepted => {}
            other => {
                error!("❌ Proposal {} changed under finalization, dropping team {}", proposal.id, team.id);
                self.teams.delete(&team.id)?;
                let status = other.map(|p| p.status).unwrap_or(ProposalStatus::Rejected);
                return Err(ServiceError::StaleProposal(format!(
                    "proposal {} is {:?}",
                    proposal.id, status
                )));
            }
        }

        // The team exists from here on; later failures are logged, not returned
        if let Err(e) = self.directory.attach_team(&team) {
            error!("❌ Could not attach team {} to the directory: {}", team.id, e);
        }
        let superseded = self.invalidate_conflicts(&team);
        info!(
            "✅ Team '{}' formed in {} from proposal {} ({} overlapping proposals rejected)",
            team.name, team.course_id, proposal.id, superseded
        );

        Ok(RespondOutcome::TeamFormed { proposal_id: proposal.id.clone(), team })
    }

    // Reject every other pending proposal that shares a member with `team`
    fn invalidate_conflicts(&self, team: &Team) -> usize {
        let reason = format!("Superseded by team '{}'", team.name);
        let mut rejected = 0;
        let proposals = match self.proposals.list_for_course(&team.course_id) {
            Ok(proposals) => proposals,
            Err(e) => {
                error!("❌ Could not list proposals overlapping team {}: {}", team.id, e);
                return rejected;
            }
        };
        for proposal in proposals {
            if Some(&proposal.id) == team.proposal_id.as_ref()
                || !proposal.is_pending()
                || !proposal.shares_member_with(&team.members)
            {
                continue;
            }
            match self.proposals.transition(
                &proposal.id,
                ProposalStatus::Pending,
                ProposalStatus::Rejected,
                &reason,
            ) {
                Ok(Some(_)) => {
                    debug!("Proposal {} superseded by team {}", proposal.id, team.id);
                    rejected += 1;
                }
                Ok(None) => {}
                Err(e) => error!("❌ Could not reject proposal {} overlapping team {}: {}", proposal.id, team.id, e),
            }
        }
        rejected
    }

    // ----- expiry -----

    /// Reject every pending proposal past its expiry. Failures are logged and
    /// left for the next sweep.
    pub fn sweep_expired(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let now = self.clock.now();

        let proposals = match self.proposals.list() {
            Ok(proposals) => proposals,
            Err(e) => {
                error!("❌ Sweep could not list proposals: {}", e);
                report.failures += 1;
                return report;
            }
        };

        let mut due: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for proposal in proposals {
            if proposal.is_pending() && proposal.is_expired(now) {
                due.entry(proposal.course_id).or_default().push(proposal.id);
            }
        }

        for (course_id, ids) in due {
            let swept = self.locks.with_course(&course_id, || {
                let mut expired: usize = 0;
                let mut failures: usize = 0;
                for id in &ids {
                    match self.proposals.transition(
                        id,
                        ProposalStatus::Pending,
                        ProposalStatus::Rejected,
                        EXPIRED_DESC,
                    ) {
                        Ok(Some(_)) => expired += 1,
                        Ok(None) => debug!("Proposal {} resolved before the sweep reached it", id),
                        Err(e) => {
                            error!("❌ Could not expire proposal {}: {}", id, e);
                            failures += 1;
                        }
                    }
                }
                Ok((expired, failures))
            });
            match swept {
                Ok((expired, failures)) => {
                    report.expired += expired;
                    report.failures += failures;
                }
                Err(e) => {
                    error!("❌ Sweep of course {} failed: {}", course_id, e);
                    report.failures += ids.len();
                }
            }
        }

        if report.expired > 0 {
            info!("⌛ Expired {} proposals", report.expired);
        }
        report
    }

    /// Delete dead proposals whose expiry lies beyond the retention window.
    pub fn purge_stale(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let cutoff = self.clock.now() - self.settings.retention;

        let proposals = match self.proposals.list() {
            Ok(proposals) => proposals,
            Err(e) => {
                error!("❌ Purge could not list proposals: {}", e);
                report.failures += 1;
                return report;
            }
        };

        for proposal in proposals {
            if proposal.is_pending() || proposal.expires_at >= cutoff {
                continue;
            }
            match self.proposals.delete(&proposal.id) {
                Ok(_) => {
                    report.purged += 1;
                    if let Err(e) = self.channel.revoke(&proposal.id) {
                        warn!("Could not revoke tokens of purged proposal {}: {}", proposal.id, e);
                    }
                }
                Err(e) => {
                    error!("❌ Could not purge proposal {}: {}", proposal.id, e);
                    report.failures += 1;
                }
            }
        }

        if report.purged > 0 {
            info!("🧹 Purged {} stale proposals", report.purged);
        }
        report
    }

    // Periodic maintenance: expire, purge, drop idle locks
    pub fn run_maintenance(&self) -> SweepReport {
        let swept = self.sweep_expired();
        let purged = self.purge_stale();
        if let Err(e) = self.locks.cleanup_idle() {
            warn!("Error cleaning up course locks: {}", e);
        }
        SweepReport {
            expired: swept.expired,
            purged: purged.purged,
            failures: swept.failures + purged.failures,
        }
    }

    // Lazily expire a proposal read outside the sweep
    fn refresh(&self, proposal: TeamProposal, now: chrono::DateTime<chrono::Utc>) -> Result<TeamProposal, ServiceError> {
        if !proposal.is_pending() || !proposal.is_expired(now) {
            return Ok(proposal);
        }
        match self.proposals.transition(
            &proposal.id,
            ProposalStatus::Pending,
            ProposalStatus::Rejected,
            EXPIRED_DESC,
        )? {
            Some(updated) => {
                info!("⌛ Proposal {} expired", updated.id);
                Ok(updated)
            }
            None => Ok(self.proposals.find(&proposal.id)?.unwrap_or(proposal)),
        }
    }

    fn course_proposals(
        &self,
        course_id: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<TeamProposal>, ServiceError> {
        self.proposals
            .list_for_course(course_id)?
            .into_iter()
            .map(|p| self.refresh(p, now))
            .collect()
    }

    // ----- reads -----

    fn authorize(&self, caller: &str, course_id: &str) -> Result<(), ServiceError> {
        if !self.directory.is_authorized(caller, course_id)? {
            warn!("❌ {} is not authorized for course {}", caller, course_id);
            return Err(ServiceError::NotAuthorized);
        }
        Ok(())
    }

    fn authorize_professor(&self, caller: &str, course_id: &str) -> Result<(), ServiceError> {
        if !self.directory.is_professor(caller, course_id)? {
            warn!("❌ {} is not a professor of course {}", caller, course_id);
            return Err(ServiceError::NotAuthorized);
        }
        Ok(())
    }

    fn require_course(&self, course_id: &str) -> Result<(), ServiceError> {
        if !self.directory.course_exists(course_id)? {
            return Err(ServiceError::NotFound(format!("course '{}'", course_id)));
        }
        Ok(())
    }

    fn require_student(&self, student_id: &str) -> Result<(), ServiceError> {
        if !self.directory.student_exists(student_id)? {
            return Err(ServiceError::NotFound(format!("student '{}'", student_id)));
        }
        Ok(())
    }

    fn load_proposal(&self, proposal_id: &str) -> Result<TeamProposal, ServiceError> {
        let proposal = self
            .proposals
            .find(proposal_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("proposal '{}'", proposal_id)))?;
        self.refresh(proposal, self.clock.now())
    }

    pub fn get_proposal(&self, proposal_id: &str, caller: &str) -> Result<ProposalSummary, ServiceError> {
        let proposal = self.load_proposal(proposal_id)?;
        self.authorize(caller, &proposal.course_id)?;
        Ok(proposal.summary())
    }

    pub fn proposal_members(&self, proposal_id: &str, caller: &str) -> Result<Vec<ProposalMember>, ServiceError> {
        let proposal = self.load_proposal(proposal_id)?;
        self.authorize(caller, &proposal.course_id)?;
        Ok(proposal
            .members
            .iter()
            .filter_map(|member| {
                proposal.member_response(member).map(|response| ProposalMember {
                    student_id: member.clone(),
                    response,
                })
            })
            .collect())
    }

    pub fn list_proposals_for_course(&self, course_id: &str, caller: &str) -> Result<Vec<ProposalSummary>, ServiceError> {
        self.require_course(course_id)?;
        self.authorize(caller, course_id)?;
        let mut proposals = self.course_proposals(course_id, self.clock.now())?;
        proposals.sort_by_key(|p| p.created_at);
        Ok(proposals.iter().map(TeamProposal::summary).collect())
    }

    pub fn list_pending_for_course(&self, course_id: &str, caller: &str) -> Result<Vec<ProposalSummary>, ServiceError> {
        Ok(self
            .list_proposals_for_course(course_id, caller)?
            .into_iter()
            .filter(|p| p.status == ProposalStatus::Pending)
            .collect())
    }

    pub fn list_proposals_for_student(&self, student_id: &str) -> Result<Vec<ProposalSummary>, ServiceError> {
        self.require_student(student_id)?;
        let now = self.clock.now();
        let mut proposals = self
            .proposals
            .list_for_student(student_id)?
            .into_iter()
            .map(|p| self.refresh(p, now))
            .collect::<Result<Vec<_>, _>>()?;
        proposals.sort_by_key(|p| p.created_at);
        Ok(proposals.iter().map(TeamProposal::summary).collect())
    }

    pub fn list_pending_for_student(&self, student_id: &str) -> Result<Vec<ProposalSummary>, ServiceError> {
        Ok(self
            .list_proposals_for_student(student_id)?
            .into_iter()
            .filter(|p| p.status == ProposalStatus::Pending)
            .collect())
    }

    // True once the student holds no unconsumed token on the proposal
    pub fn has_responded(&self, student_id: &str, proposal_id: &str) -> Result<bool, ServiceError> {
        self.require_student(student_id)?;
        let proposal = self.load_proposal(proposal_id)?;
        if !proposal.has_member(student_id) {
            return Err(ServiceError::NotFound(format!(
                "student '{}' in proposal '{}'",
                student_id, proposal_id
            )));
        }
        Ok(!proposal.tokens.contains_key(student_id))
    }

    pub fn has_accepted_commitment(&self, student_id: &str, course_id: &str) -> Result<bool, ServiceError> {
        self.require_student(student_id)?;
        self.require_course(course_id)?;
        let proposals = self.course_proposals(course_id, self.clock.now())?;
        Ok(committed_elsewhere(&proposals, student_id, None))
    }

    pub fn teams_for_course(&self, course_id: &str, caller: &str) -> Result<Vec<Team>, ServiceError> {
        self.require_course(course_id)?;
        self.authorize(caller, course_id)?;
        let mut teams = self.teams.list_for_course(course_id)?;
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }

    pub fn team_for_student(&self, student_id: &str, course_id: &str) -> Result<Option<Team>, ServiceError> {
        self.require_student(student_id)?;
        self.require_course(course_id)?;
        self.teams.find_for_student(student_id, course_id)
    }

    pub fn students_in_teams(&self, course_id: &str, caller: &str) -> Result<Vec<Student>, ServiceError> {
        self.partition_enrolled(course_id, caller, true)
    }

    pub fn available_students(&self, course_id: &str, caller: &str) -> Result<Vec<Student>, ServiceError> {
        self.partition_enrolled(course_id, caller, false)
    }

    fn partition_enrolled(&self, course_id: &str, caller: &str, teamed: bool) -> Result<Vec<Student>, ServiceError> {
        self.require_course(course_id)?;
        self.authorize(caller, course_id)?;
        let mut selected = Vec::new();
        for student in self.directory.enrolled_students(course_id)? {
            if self.is_teamed(&student.id, course_id)? == teamed {
                selected.push(student);
            }
        }
        Ok(selected)
    }

    // ----- administration -----

    pub fn delete_proposal(&self, proposal_id: &str, caller: &str) -> Result<(), ServiceError> {
        let proposal = self
            .proposals
            .find(proposal_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("proposal '{}'", proposal_id)))?;
        self.authorize_professor(caller, &proposal.course_id)?;

        info!("🗑️ Deleting proposal {}", proposal_id);
        self.locks.with_course(&proposal.course_id, || {
            self.proposals.delete(proposal_id)?;
            let revoked = self.channel.revoke(proposal_id)?;
            debug!("Revoked {} tokens of proposal {}", revoked, proposal_id);
            Ok(())
        })
    }

    pub fn delete_team(&self, team_id: &str, caller: &str) -> Result<(), ServiceError> {
        let team = self
            .teams
            .find(team_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("team '{}'", team_id)))?;
        self.authorize_professor(caller, &team.course_id)?;

        info!("🗑️ Deleting team {} of course {}", team.name, team.course_id);
        self.locks.with_course(&team.course_id, || {
            self.teams.delete(team_id)?;
            self.directory.detach_team(&team)
        })
    }

    pub fn check_roster(&self, course_id: &str, csv_text: &str, caller: &str) -> Result<RosterReport, ServiceError> {
        self.require_course(course_id)?;
        self.authorize_professor(caller, course_id)?;
        let rows = roster::parse_roster_csv(csv_text)?;
        info!("📋 Checking {} roster rows for course {}", rows.len(), course_id);
        roster::classify_roster(self.directory.as_ref(), course_id, rows)
    }
}

fn committed_elsewhere(proposals: &[TeamProposal], student_id: &str, except: Option<&str>) -> bool {
    proposals.iter().any(|p| {
        p.is_pending() && Some(p.id.as_str()) != except && p.accepted.contains(student_id)
    })
}

// Decline re-deliveries on a dead proposal are no-ops; accepts are refused
fn stale_response(proposal: TeamProposal, outcome: ConsentOutcome) -> Result<RespondOutcome, ServiceError> {
    match outcome {
        ConsentOutcome::Decline => {
            debug!("Decline on resolved proposal {} ignored", proposal.id);
            Ok(RespondOutcome::AlreadyResolved {
                proposal_id: proposal.id,
                status: proposal.status,
            })
        }
        ConsentOutcome::Accept => Err(ServiceError::StaleProposal(format!(
            "proposal {} is {:?}",
            proposal.id, proposal.status
        ))),
    }
}
