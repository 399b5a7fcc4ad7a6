// Shared fixture for engine, roster and route tests
use crate::models::{Course, Student};
use crate::services::directory::InMemoryDirectory;
use crate::services::formation::{EngineSettings, TeamFormationEngine};
use crate::services::notification::{NotificationChannel, OutboxChannel};
use crate::utils::clock::ManualClock;
use crate::utils::proposal_storage::MemoryProposalStore;
use crate::utils::team_storage::MemoryTeamStore;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

mod formation_tests;

pub const PROFESSOR: &str = "prof.rossi";

pub struct Fixture {
    pub engine: Arc<TeamFormationEngine>,
    pub directory: Arc<InMemoryDirectory>,
    pub channel: Arc<OutboxChannel>,
    pub clock: Arc<ManualClock>,
    pub proposals: Arc<MemoryProposalStore>,
}

pub fn username(student_id: &str) -> String {
    format!("user_{}", student_id)
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn course(id: &str, enabled: bool, min: usize, max: usize) -> Course {
    Course {
        id: id.to_string(),
        name: format!("Course {}", id),
        enabled,
        min_team_size: min,
        max_team_size: max,
        professors: [PROFESSOR.to_string()].into_iter().collect(),
    }
}

fn student(id: &str, registered: bool, courses: &[&str]) -> Student {
    Student {
        id: id.to_string(),
        username: username(id),
        name: format!("Name {}", id),
        surname: format!("Surname {}", id),
        registered,
        courses: courses.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
    }
}

/// Courses: `CdP` (4..=8), `AI` (2..=4), `OLD` (disabled).
/// Students `s1`..`s9` are registered and enrolled in CdP and AI,
/// `s10` is unregistered, `s11` is registered but enrolled nowhere.
pub fn seeded_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.upsert_course(course("CdP", true, 4, 8)).unwrap();
    directory.upsert_course(course("AI", true, 2, 4)).unwrap();
    directory.upsert_course(course("OLD", false, 2, 4)).unwrap();
    for n in 1..=9 {
        directory
            .upsert_student(student(&format!("s{}", n), true, &["CdP", "AI", "OLD"]))
            .unwrap();
    }
    directory.upsert_student(student("s10", false, &[])).unwrap();
    directory.upsert_student(student("s11", true, &[])).unwrap();
    directory
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn fixture() -> Fixture {
    let directory = Arc::new(seeded_directory());

    let channel = Arc::new(OutboxChannel::new("http://cohort.test"));
    let clock = Arc::new(ManualClock::new(start_time()));
    let proposals = Arc::new(MemoryProposalStore::new());

    let engine = TeamFormationEngine::new(
        directory.clone(),
        channel.clone(),
        proposals.clone(),
        Arc::new(MemoryTeamStore::new()),
        EngineSettings::default(),
    )
    .with_clock(clock.clone());

    Fixture {
        engine: Arc::new(engine),
        directory,
        channel,
        clock,
        proposals,
    }
}

impl Fixture {
    // Plain response token dispatched to `student_id` for `proposal_id`
    pub fn token(&self, proposal_id: &str, student_id: &str) -> String {
        self.channel
            .token_for(proposal_id, student_id)
            .unwrap()
            .expect("token was dispatched")
    }

    pub fn propose(&self, course_id: &str, team_name: &str, creator: &str, members: &[&str]) -> String {
        self.engine
            .create_proposal(course_id, team_name, &ids(members), &username(creator))
            .expect("proposal is valid")
    }
}
