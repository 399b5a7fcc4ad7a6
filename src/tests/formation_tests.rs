use super::{fixture, ids, username, Fixture, PROFESSOR};
use crate::models::{
    ConsentOutcome, MemberResponse, ProposalStatus, RespondOutcome, ServiceError,
};
use crate::services::directory::Directory;
use crate::utils::proposal_storage::ProposalStore;
use chrono::Duration;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

fn accept(f: &Fixture, proposal_id: &str, student_id: &str) -> Result<RespondOutcome, ServiceError> {
    f.engine.respond(&f.token(proposal_id, student_id), ConsentOutcome::Accept)
}

fn decline(f: &Fixture, proposal_id: &str, student_id: &str) -> Result<RespondOutcome, ServiceError> {
    f.engine.respond(&f.token(proposal_id, student_id), ConsentOutcome::Decline)
}

fn status_of(f: &Fixture, proposal_id: &str) -> ProposalStatus {
    f.engine.get_proposal(proposal_id, PROFESSOR).unwrap().status
}

#[test]
fn roster_size_must_lie_within_course_bounds() {
    let f = fixture();

    // Duplicates collapse to three distinct members
    let err = f
        .engine
        .create_proposal("CdP", "trio", &ids(&["s1", "s2", "s3", "s2", "s1"]), &username("s1"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCardinality(_)), "{:?}", err);

    f.propose("CdP", "four", "s1", &["s1", "s2", "s3", "s4"]);
    f.propose("CdP", "eight", "s2", &["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8"]);

    let err = f
        .engine
        .create_proposal(
            "CdP",
            "nine",
            &ids(&["s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9"]),
            &username("s3"),
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidCardinality(_)));
}

#[test]
fn creation_preconditions_fail_with_distinct_conditions() {
    let f = fixture();
    let four = ids(&["s1", "s2", "s3", "s4"]);

    assert!(matches!(
        f.engine.create_proposal("nope", "t", &four, &username("s1")),
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        f.engine.create_proposal("OLD", "t", &ids(&["s1", "s2"]), &username("s1")),
        Err(ServiceError::CourseNotEnabled(_))
    ));
    assert!(matches!(
        f.engine.create_proposal("CdP", "t", &four, &username("s11")),
        Err(ServiceError::NotAuthorized)
    ));

    f.propose("CdP", "alpha", "s1", &["s1", "s2", "s3", "s4"]);

    assert!(matches!(
        f.engine.create_proposal("CdP", "alpha", &ids(&["s5", "s6", "s7", "s8"]), &username("s5")),
        Err(ServiceError::Conflict(_))
    ));
    assert!(matches!(
        f.engine.create_proposal("CdP", "beta", &ids(&["s1", "s5", "s6", "s7"]), &username("s1")),
        Err(ServiceError::Conflict(_))
    ));
    assert!(matches!(
        f.engine.create_proposal("CdP", "gamma", &ids(&["s6", "s7", "s8", "s9"]), &username("s5")),
        Err(ServiceError::BadRequest(_))
    ));
    assert!(matches!(
        f.engine.create_proposal("CdP", "delta", &ids(&["s5", "s6", "s7", "ghost"]), &username("s5")),
        Err(ServiceError::NotFound(_))
    ));

    f.directory.upsert_student(crate::models::Student {
        id: "s12".to_string(),
        username: username("s12"),
        name: "N".to_string(),
        surname: "S".to_string(),
        registered: true,
        courses: ["AI".to_string()].into_iter().collect(),
    }).unwrap();
    assert!(matches!(
        f.engine.create_proposal("CdP", "delta", &ids(&["s5", "s6", "s7", "s12"]), &username("s5")),
        Err(ServiceError::Conflict(_))
    ));

    // Nothing but the first proposal was written
    assert_eq!(f.proposals.list().unwrap().len(), 1);
}

#[test]
fn every_member_gets_a_token_and_only_digests_are_stored() {
    let f = fixture();
    let id = f.propose("CdP", "alpha", "s1", &["s1", "s2", "s3", "s4"]);

    let deliveries = f.channel.deliveries();
    assert_eq!(deliveries.len(), 4);
    assert!(deliveries[0].accept_link.starts_with("http://cohort.test/proposals/respond/"));

    let stored = f.proposals.find(&id).unwrap().unwrap();
    let plain = f.token(&id, "s2");
    assert_ne!(stored.tokens["s2"], plain);
    assert_eq!(stored.tokens["s2"], crate::utils::token::digest(&plain));
    assert_eq!(stored.expires_at - stored.created_at, Duration::days(3));
}

#[test]
fn a_single_decline_rejects_and_frees_the_members() {
    let f = fixture();
    let old = f.propose("CdP", "alpha", "s1", &["s1", "s2", "s3", "s4"]);

    assert!(matches!(accept(&f, &old, "s2").unwrap(), RespondOutcome::Accepted { .. }));
    assert!(matches!(accept(&f, &old, "s3").unwrap(), RespondOutcome::Accepted { .. }));
    assert!(matches!(decline(&f, &old, "s4").unwrap(), RespondOutcome::Declined { .. }));
    assert_eq!(status_of(&f, &old), ProposalStatus::Rejected);

    // Remaining token released; a late accept is refused, a late decline is a no-op
    assert!(matches!(accept(&f, &old, "s1"), Err(ServiceError::StaleProposal(_))));
    assert!(matches!(
        decline(&f, &old, "s1").unwrap(),
        RespondOutcome::AlreadyResolved { status: ProposalStatus::Rejected, .. }
    ));
    let members = f.engine.proposal_members(&old, PROFESSOR).unwrap();
    let s1 = members.iter().find(|m| m.student_id == "s1").unwrap();
    assert_eq!(s1.response, MemberResponse::Released);

    // Same name and same creator are free again, and s2 can commit elsewhere
    let new = f.propose("CdP", "alpha", "s1", &["s1", "s2", "s5", "s6"]);
    assert!(matches!(accept(&f, &new, "s2").unwrap(), RespondOutcome::Accepted { .. }));
}

#[test]
fn first_fully_accepted_proposal_wins_and_overlaps_are_rejected() {
    let f = fixture();
    let p1 = f.propose("AI", "p1", "s1", &["s1", "s2"]);
    let p2 = f.propose("AI", "p2", "s3", &["s2", "s3"]);
    let p3 = f.propose("AI", "p3", "s4", &["s4", "s5"]);

    accept(&f, &p1, "s1").unwrap();
    let team = match accept(&f, &p1, "s2").unwrap() {
        RespondOutcome::TeamFormed { team, .. } => team,
        other => panic!("expected team, got {:?}", other),
    };

    let expected: BTreeSet<String> = ids(&["s1", "s2"]).into_iter().collect();
    assert_eq!(team.members, expected);
    assert_eq!(status_of(&f, &p1), ProposalStatus::Accepted);
    assert_eq!(f.engine.get_proposal(&p1, PROFESSOR).unwrap().team_id, Some(team.id.clone()));
    assert_eq!(status_of(&f, &p2), ProposalStatus::Rejected);
    assert_eq!(status_of(&f, &p3), ProposalStatus::Pending);

    assert!(f.directory.student_has_team("s2", "AI").unwrap());
    assert_eq!(f.engine.team_for_student("s1", "AI").unwrap().unwrap().id, team.id);
    assert!(matches!(accept(&f, &p2, "s3"), Err(ServiceError::StaleProposal(_))));

    // Teamed students cannot be proposed again
    assert!(matches!(
        f.engine.create_proposal("AI", "again", &ids(&["s6", "s1"]), &username("s6")),
        Err(ServiceError::Conflict(_))
    ));

    let pending: Vec<String> = f
        .engine
        .list_pending_for_course("AI", PROFESSOR)
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(pending, vec![p3]);
}

#[test]
fn accepting_commits_a_member_to_one_pending_proposal() {
    let f = fixture();
    let p1 = f.propose("AI", "p1", "s1", &["s1", "s2"]);
    let p2 = f.propose("AI", "p2", "s3", &["s2", "s3"]);

    accept(&f, &p1, "s2").unwrap();
    assert!(f.engine.has_accepted_commitment("s2", "AI").unwrap());
    assert!(!f.engine.has_accepted_commitment("s3", "AI").unwrap());

    assert!(matches!(accept(&f, &p2, "s2"), Err(ServiceError::Conflict(_))));
    assert!(matches!(
        f.engine.create_proposal("AI", "p3", &ids(&["s4", "s2"]), &username("s4")),
        Err(ServiceError::Conflict(_))
    ));

    // The refused accept left p2's token intact; declining p1 releases s2
    decline(&f, &p1, "s1").unwrap();
    assert!(!f.engine.has_accepted_commitment("s2", "AI").unwrap());
    assert!(matches!(accept(&f, &p2, "s2").unwrap(), RespondOutcome::Accepted { .. }));
}

#[test]
fn tokens_are_single_use() {
    let f = fixture();
    let id = f.propose("CdP", "alpha", "s1", &["s1", "s2", "s3", "s4"]);
    let token = f.token(&id, "s2");

    assert!(!f.engine.has_responded("s2", &id).unwrap());
    f.engine.respond(&token, ConsentOutcome::Accept).unwrap();
    assert!(f.engine.has_responded("s2", &id).unwrap());

    assert!(matches!(
        f.engine.respond(&token, ConsentOutcome::Accept),
        Err(ServiceError::StaleProposal(_))
    ));
    assert!(matches!(
        f.engine.respond(&token, ConsentOutcome::Decline),
        Err(ServiceError::StaleProposal(_))
    ));
    assert_eq!(status_of(&f, &id), ProposalStatus::Pending);

    assert_eq!(
        f.engine.respond("cst_forged", ConsentOutcome::Accept).unwrap_err(),
        ServiceError::token_not_found()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uses_of_one_token_succeed_exactly_once() {
    let f = fixture();
    let id = f.propose("AI", "race", "s1", &["s1", "s2", "s3"]);
    let token = f.token(&id, "s2");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&f.engine);
            let token = token.clone();
            tokio::task::spawn_blocking(move || engine.respond(&token, ConsentOutcome::Accept))
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(ServiceError::StaleProposal(_))), "{:?}", result);
    }
}

#[test]
fn concurrent_responses_never_double_book_a_student() {
    let f = fixture();
    let chain = [
        ("t1", "s1", vec!["s1", "s2"]),
        ("t2", "s3", vec!["s2", "s3"]),
        ("t3", "s4", vec!["s3", "s4"]),
        ("t4", "s5", vec!["s4", "s5"]),
        ("t5", "s6", vec!["s5", "s6"]),
        ("t6", "s7", vec!["s6", "s7", "s1"]),
    ];
    let mut tokens = Vec::new();
    let mut proposal_ids = Vec::new();
    for (name, creator, members) in &chain {
        let id = f.propose("AI", name, creator, members);
        for member in members {
            tokens.push(f.token(&id, member));
        }
        proposal_ids.push(id);
    }

    thread::scope(|scope| {
        for (i, token) in tokens.iter().enumerate() {
            let engine = &f.engine;
            let reversed = i % 2 == 1;
            scope.spawn(move || {
                if reversed {
                    thread::yield_now();
                }
                let _ = engine.respond(token, ConsentOutcome::Accept);
            });
        }
    });

    let teams = f.engine.teams_for_course("AI", PROFESSOR).unwrap();
    let mut seen = BTreeSet::new();
    for team in &teams {
        for member in &team.members {
            assert!(seen.insert(member.clone()), "{} is on two teams", member);
        }
    }

    for id in &proposal_ids {
        let proposal = f.engine.get_proposal(id, PROFESSOR).unwrap();
        let members: BTreeSet<String> = proposal.members.iter().cloned().collect();
        match proposal.status {
            ProposalStatus::Accepted => {
                let team = teams
                    .iter()
                    .find(|t| Some(&t.id) == proposal.team_id.as_ref())
                    .expect("accepted proposal has a team");
                assert_eq!(team.members, members);
            }
            ProposalStatus::Pending => {
                assert!(members.is_disjoint(&seen), "pending proposal {} overlaps a team", id);
            }
            ProposalStatus::Rejected => {}
        }
    }
}

#[test]
fn expired_proposals_are_hidden_lazily_and_swept_idempotently() {
    let f = fixture();
    let lazy = f.propose("AI", "lazy", "s1", &["s1", "s2"]);
    let swept = f.propose("CdP", "swept", "s3", &["s3", "s4", "s5", "s6"]);

    f.clock.advance(Duration::days(3) + Duration::minutes(1));

    assert!(f.engine.list_pending_for_course("AI", PROFESSOR).unwrap().is_empty());
    assert_eq!(status_of(&f, &lazy), ProposalStatus::Rejected);

    let report = f.engine.sweep_expired();
    assert_eq!(report.expired, 1);
    assert_eq!(report.failures, 0);
    assert_eq!(f.proposals.find(&swept).unwrap().unwrap().status, ProposalStatus::Rejected);
    assert!(f.proposals.find(&swept).unwrap().unwrap().tokens.is_empty());
    assert!(f.engine.list_pending_for_student("s3").unwrap().is_empty());

    assert_eq!(f.engine.sweep_expired().expired, 0);

    assert!(matches!(accept(&f, &swept, "s4"), Err(ServiceError::StaleProposal(_))));
    assert!(matches!(
        decline(&f, &swept, "s4").unwrap(),
        RespondOutcome::AlreadyResolved { .. }
    ));
}

#[test]
fn last_accept_after_expiry_does_not_form_a_team() {
    let f = fixture();
    let id = f.propose("AI", "late", "s1", &["s1", "s2"]);
    accept(&f, &id, "s1").unwrap();

    f.clock.advance(Duration::days(4));

    assert!(matches!(accept(&f, &id, "s2"), Err(ServiceError::StaleProposal(_))));
    assert!(f.engine.teams_for_course("AI", PROFESSOR).unwrap().is_empty());
}

#[test]
fn dispatch_failure_leaves_nothing_behind() {
    let f = fixture();
    f.channel.set_online(false);

    let err = f
        .engine
        .create_proposal("AI", "offline", &ids(&["s1", "s2"]), &username("s1"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::DispatchFailure(_)));
    assert!(f.proposals.list().unwrap().is_empty());
    assert!(f.channel.deliveries().is_empty());

    f.channel.set_online(true);
    f.propose("AI", "offline", "s1", &["s1", "s2"]);
}

#[test]
fn dead_proposals_are_purged_after_retention() {
    let f = fixture();
    let dead = f.propose("AI", "dead", "s1", &["s1", "s2"]);
    let token = f.token(&dead, "s1");
    decline(&f, &dead, "s2").unwrap();
    let live = f.propose("CdP", "live", "s3", &["s3", "s4", "s5", "s6"]);

    f.clock.advance(Duration::days(20));
    assert_eq!(f.engine.purge_stale().purged, 0);

    f.clock.advance(Duration::days(14));
    let report = f.engine.run_maintenance();
    assert_eq!(report.expired, 1);
    assert_eq!(report.purged, 2);

    assert!(f.proposals.find(&dead).unwrap().is_none());
    assert!(f.proposals.find(&live).unwrap().is_none());
    assert_eq!(
        f.engine.respond(&token, ConsentOutcome::Decline).unwrap_err(),
        ServiceError::token_not_found()
    );
}

#[test]
fn proposal_members_report_each_response() {
    let f = fixture();
    let id = f.propose("CdP", "alpha", "s1", &["s1", "s2", "s3", "s4"]);
    accept(&f, &id, "s1").unwrap();
    accept(&f, &id, "s3").unwrap();

    let members = f.engine.proposal_members(&id, &username("s2")).unwrap();
    let response = |student: &str| members.iter().find(|m| m.student_id == student).unwrap().response;
    assert_eq!(response("s1"), MemberResponse::Accepted);
    assert_eq!(response("s2"), MemberResponse::Pending);
    assert_eq!(response("s3"), MemberResponse::Accepted);

    let summary = f.engine.get_proposal(&id, &username("s1")).unwrap();
    assert_eq!(summary.awaiting, ids(&["s2", "s4"]));

    assert!(matches!(
        f.engine.get_proposal(&id, &username("s11")),
        Err(ServiceError::NotAuthorized)
    ));
}

#[test]
fn team_listings_and_deletion() {
    let f = fixture();
    let id = f.propose("AI", "duo", "s1", &["s1", "s2"]);
    accept(&f, &id, "s1").unwrap();
    accept(&f, &id, "s2").unwrap();

    let teamed: Vec<String> = f
        .engine
        .students_in_teams("AI", PROFESSOR)
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(teamed, ids(&["s1", "s2"]));
    let available = f.engine.available_students("AI", PROFESSOR).unwrap();
    assert_eq!(available.len(), 7);

    let team = f.engine.team_for_student("s2", "AI").unwrap().unwrap();
    assert!(matches!(
        f.engine.delete_team(&team.id, &username("s1")),
        Err(ServiceError::NotAuthorized)
    ));
    f.engine.delete_team(&team.id, PROFESSOR).unwrap();

    assert!(!f.directory.student_has_team("s1", "AI").unwrap());
    assert!(f.engine.team_for_student("s1", "AI").unwrap().is_none());
    assert!(matches!(
        f.engine.delete_team(&team.id, PROFESSOR),
        Err(ServiceError::NotFound(_))
    ));
}

#[test]
fn professors_can_delete_proposals() {
    let f = fixture();
    let id = f.propose("AI", "gone", "s1", &["s1", "s2"]);
    let token = f.token(&id, "s2");

    assert!(matches!(
        f.engine.delete_proposal(&id, &username("s1")),
        Err(ServiceError::NotAuthorized)
    ));
    f.engine.delete_proposal(&id, PROFESSOR).unwrap();

    assert!(matches!(f.engine.get_proposal(&id, PROFESSOR), Err(ServiceError::NotFound(_))));
    assert_eq!(
        f.engine.respond(&token, ConsentOutcome::Accept).unwrap_err(),
        ServiceError::token_not_found()
    );
}
