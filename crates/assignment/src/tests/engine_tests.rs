use std::{collections::BTreeSet, sync::Arc};

use futures::future::join_all;
use shared::{
    domain::{PullRequestStatus, TeamId, User},
    error::ConflictKind,
};

use super::*;
use crate::{
    memory::{InMemoryLedger, InMemoryTeams},
    sampling::{RandomSampler, ReviewerSampler},
};

/// Picks candidates in the order the store returns them (sorted by id).
struct FirstSampler;

impl ReviewerSampler for FirstSampler {
    fn sample(&self, candidates: Vec<UserId>, count: usize) -> Vec<UserId> {
        candidates.into_iter().take(count).collect()
    }
}

fn uid(raw: &str) -> UserId {
    UserId::from(raw)
}

fn prid(raw: &str) -> PullRequestId {
    PullRequestId::from(raw)
}

fn set(raw: &[&str]) -> BTreeSet<UserId> {
    raw.iter().map(|id| uid(id)).collect()
}

async fn team(members: &[(&str, bool)]) -> Arc<InMemoryTeams> {
    let teams = Arc::new(InMemoryTeams::new());
    for (id, is_active) in members {
        teams
            .insert_member(
                TeamId(1),
                User {
                    user_id: uid(id),
                    username: id.to_uppercase(),
                    is_active: *is_active,
                },
            )
            .await;
    }
    teams
}

fn engine_with(
    teams: Arc<InMemoryTeams>,
    sampler: Arc<dyn ReviewerSampler>,
) -> ReviewAssignmentEngine {
    ReviewAssignmentEngine::new(
        TeamDirectory::new(teams, sampler),
        Arc::new(InMemoryLedger::new()),
    )
}

async fn three_member_engine() -> ReviewAssignmentEngine {
    let teams = team(&[("u1", true), ("u2", true), ("u3", true)]).await;
    engine_with(teams, Arc::new(FirstSampler))
}

#[tokio::test]
async fn create_assigns_two_teammates_and_never_the_author() {
    let engine = three_member_engine().await;
    let pr = engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");

    assert_eq!(pr.status, PullRequestStatus::Open);
    assert_eq!(pr.assigned_reviewers, set(&["u2", "u3"]));
    assert!(pr.merged_at.is_none());
}

#[tokio::test]
async fn random_sampling_never_picks_author_or_inactive_members() {
    let teams = team(&[
        ("u1", true),
        ("u2", true),
        ("u3", false),
        ("u4", true),
        ("u5", true),
    ])
    .await;
    let engine = engine_with(teams, Arc::new(RandomSampler));

    for n in 0..40 {
        let pr = engine
            .create(uid("u1"), prid(&format!("pr-{n}")), "x".into())
            .await
            .expect("create");
        assert_eq!(pr.assigned_reviewers.len(), 2);
        assert!(!pr.assigned_reviewers.contains(&uid("u1")));
        assert!(!pr.assigned_reviewers.contains(&uid("u3")));
    }
}

#[tokio::test]
async fn create_with_one_eligible_teammate_assigns_one_reviewer() {
    let teams = team(&[("u1", true), ("u2", true), ("u3", false)]).await;
    let engine = engine_with(teams, Arc::new(FirstSampler));

    let pr = engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");
    assert_eq!(pr.assigned_reviewers, set(&["u2"]));
}

#[tokio::test]
async fn create_for_author_without_team_is_not_found() {
    let engine = three_member_engine().await;
    let err = engine
        .create(uid("ghost"), prid("pr-1"), "x".into())
        .await
        .expect_err("should fail");
    assert_eq!(err, ReviewError::NotFound(Entity::Author));
}

#[tokio::test]
async fn duplicate_create_is_rejected_regardless_of_payload() {
    let engine = three_member_engine().await;
    engine
        .create(uid("u1"), prid("pr-1"), "first".into())
        .await
        .expect("create");

    let err = engine
        .create(uid("u2"), prid("pr-1"), "second".into())
        .await
        .expect_err("duplicate");
    assert_eq!(err, ReviewError::Conflict(ConflictKind::AlreadyExists));

    let stored = engine.ledger().find(&prid("pr-1")).await.expect("find");
    assert_eq!(stored.name, "first");
    assert_eq!(stored.author_id, uid("u1"));
}

#[tokio::test]
async fn merge_is_idempotent_and_stamps_once() {
    let engine = three_member_engine().await;
    engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");

    let first = engine.merge(&prid("pr-1")).await.expect("merge");
    let second = engine.merge(&prid("pr-1")).await.expect("merge again");

    assert_eq!(first.status, PullRequestStatus::Merged);
    assert_eq!(second.status, PullRequestStatus::Merged);
    assert!(first.merged_at.is_some());
    assert_eq!(first.merged_at, second.merged_at);
    assert_eq!(first.assigned_reviewers, second.assigned_reviewers);
}

#[tokio::test]
async fn merge_of_unknown_pull_request_is_not_found() {
    let engine = three_member_engine().await;
    let err = engine.merge(&prid("nope")).await.expect_err("missing");
    assert_eq!(err, ReviewError::NotFound(Entity::PullRequest));
}

#[tokio::test]
async fn reassign_swaps_in_the_only_other_teammate() {
    let engine = three_member_engine().await;
    engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");

    let outcome = engine
        .reassign(&prid("pr-1"), &uid("u2"))
        .await
        .expect("reassign");
    assert_eq!(outcome.replaced_by, uid("u3"));
    assert!(!outcome.pull_request.assigned_reviewers.contains(&uid("u2")));
    assert_eq!(outcome.pull_request.assigned_reviewers, set(&["u3"]));
    assert_eq!(outcome.pull_request.status, PullRequestStatus::Open);
}

#[tokio::test]
async fn reassign_on_merged_pull_request_is_rejected() {
    let teams = team(&[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
    let engine = engine_with(teams, Arc::new(FirstSampler));
    engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");
    let merged = engine.merge(&prid("pr-1")).await.expect("merge");

    let err = engine
        .reassign(&prid("pr-1"), &uid("u2"))
        .await
        .expect_err("merged");
    assert_eq!(err, ReviewError::Conflict(ConflictKind::AlreadyMerged));

    let stored = engine.ledger().find(&prid("pr-1")).await.expect("find");
    assert_eq!(stored.assigned_reviewers, merged.assigned_reviewers);
}

#[tokio::test]
async fn reassign_of_unassigned_reviewer_is_rejected() {
    let teams = team(&[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
    let engine = engine_with(teams, Arc::new(FirstSampler));
    engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");

    let err = engine
        .reassign(&prid("pr-1"), &uid("u4"))
        .await
        .expect_err("not assigned");
    assert_eq!(err, ReviewError::Conflict(ConflictKind::NotAssigned));
}

#[tokio::test]
async fn reassign_without_candidate_is_a_conflict() {
    let teams = team(&[("u1", true), ("u2", true)]).await;
    let engine = engine_with(teams, Arc::new(FirstSampler));
    engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");

    let err = engine
        .reassign(&prid("pr-1"), &uid("u2"))
        .await
        .expect_err("no candidate");
    assert_eq!(err, ReviewError::Conflict(ConflictKind::NoCandidate));

    let stored = engine.ledger().find(&prid("pr-1")).await.expect("find");
    assert_eq!(stored.assigned_reviewers, set(&["u2"]));
}

#[tokio::test]
async fn reassign_of_reviewer_without_team_is_not_found() {
    let engine = three_member_engine().await;
    let err = engine
        .reassign(&prid("pr-1"), &uid("ghost"))
        .await
        .expect_err("missing reviewer");
    assert_eq!(err, ReviewError::NotFound(Entity::Reviewer));
}

#[tokio::test]
async fn deactivated_teammate_is_not_picked_as_replacement() {
    let teams = team(&[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
    let engine = engine_with(teams.clone(), Arc::new(FirstSampler));
    engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");
    assert!(teams.set_active(&uid("u4"), false).await);

    let outcome = engine
        .reassign(&prid("pr-1"), &uid("u2"))
        .await
        .expect("reassign");
    assert_eq!(outcome.replaced_by, uid("u3"));
    assert_eq!(outcome.pull_request.assigned_reviewers, set(&["u3"]));
}

#[tokio::test]
async fn concurrent_creates_with_one_id_have_a_single_winner() {
    let engine = three_member_engine().await;
    let attempts = (0..8).map(|n| {
        let engine = engine.clone();
        async move {
            engine
                .create(uid("u1"), prid("pr-race"), format!("attempt {n}"))
                .await
        }
    });
    let results = join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|err| {
        *err == ReviewError::Conflict(ConflictKind::AlreadyExists)
    }));
}

#[tokio::test]
async fn concurrent_reassigns_of_one_reviewer_have_a_single_winner() {
    let teams = team(&[("u1", true), ("u2", true), ("u3", true), ("u4", true)]).await;
    let engine = engine_with(teams, Arc::new(FirstSampler));
    engine
        .create(uid("u1"), prid("pr-1"), "x".into())
        .await
        .expect("create");

    let attempts = (0..4).map(|_| {
        let engine = engine.clone();
        async move { engine.reassign(&prid("pr-1"), &uid("u2")).await }
    });
    let results = join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|err| {
        *err == ReviewError::Conflict(ConflictKind::NotAssigned)
    }));
}
