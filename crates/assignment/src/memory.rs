//! In-memory implementations of the store seams.
//!
//! All state lives behind `tokio` locks and is lost when the value drops.
//! Each ledger mutation holds the write lock for its whole check-and-apply
//! sequence, which gives the same serialization per pull request as the
//! SQLite ledger.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{
        NewPullRequest, PullRequest, PullRequestId, PullRequestStatus, TeamId, User, UserId,
    },
    error::{ConflictKind, Entity, ReviewError},
};
use tokio::sync::{Mutex, RwLock};

use crate::store::{MembershipStore, PullRequestLedger};

#[derive(Default)]
struct Roster {
    users: HashMap<UserId, User>,
    team_of: HashMap<UserId, TeamId>,
}

/// Team roster held in memory.
#[derive(Default)]
pub struct InMemoryTeams {
    roster: RwLock<Roster>,
}

impl InMemoryTeams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `user` to `team_id`, replacing any previous binding.
    pub async fn insert_member(&self, team_id: TeamId, user: User) {
        let mut roster = self.roster.write().await;
        roster.team_of.insert(user.user_id.clone(), team_id);
        roster.users.insert(user.user_id.clone(), user);
    }

    pub async fn set_active(&self, user_id: &UserId, is_active: bool) -> bool {
        let mut roster = self.roster.write().await;
        match roster.users.get_mut(user_id) {
            Some(user) => {
                user.is_active = is_active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl MembershipStore for InMemoryTeams {
    async fn team_of(&self, user_id: &UserId) -> Result<Option<TeamId>, ReviewError> {
        Ok(self.roster.read().await.team_of.get(user_id).copied())
    }

    async fn active_members(
        &self,
        team_id: TeamId,
        excluded: &[UserId],
    ) -> Result<Vec<UserId>, ReviewError> {
        let roster = self.roster.read().await;
        let mut members: Vec<UserId> = roster
            .team_of
            .iter()
            .filter(|(user_id, team)| **team == team_id && !excluded.contains(*user_id))
            .filter(|(user_id, _)| roster.users.get(*user_id).is_some_and(|u| u.is_active))
            .map(|(user_id, _)| user_id.clone())
            .collect();
        members.sort();
        Ok(members)
    }
}

/// Pull-request ledger held in memory.
#[derive(Default)]
pub struct InMemoryLedger {
    records: Mutex<HashMap<PullRequestId, PullRequest>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PullRequestLedger for InMemoryLedger {
    async fn create(
        &self,
        draft: NewPullRequest,
        reviewer_ids: BTreeSet<UserId>,
    ) -> Result<PullRequest, ReviewError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&draft.id) {
            return Err(ReviewError::Conflict(ConflictKind::AlreadyExists));
        }

        let record = PullRequest {
            id: draft.id,
            name: draft.name,
            author_id: draft.author_id,
            status: PullRequestStatus::Open,
            assigned_reviewers: reviewer_ids,
            merged_at: None,
            created_at: Utc::now(),
        };
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn merge(&self, id: &PullRequestId) -> Result<PullRequest, ReviewError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or(ReviewError::NotFound(Entity::PullRequest))?;
        if !record.is_merged() {
            record.status = PullRequestStatus::Merged;
            record.merged_at = Some(Utc::now());
        }
        Ok(record.clone())
    }

    async fn reassign(
        &self,
        id: &PullRequestId,
        old_reviewer_id: &UserId,
        new_reviewer_id: &UserId,
    ) -> Result<PullRequest, ReviewError> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(id)
            .ok_or(ReviewError::NotFound(Entity::PullRequest))?;
        if record.is_merged() {
            return Err(ReviewError::Conflict(ConflictKind::AlreadyMerged));
        }
        if !record.assigned_reviewers.remove(old_reviewer_id) {
            return Err(ReviewError::Conflict(ConflictKind::NotAssigned));
        }
        record.assigned_reviewers.insert(new_reviewer_id.clone());
        Ok(record.clone())
    }

    async fn find(&self, id: &PullRequestId) -> Result<PullRequest, ReviewError> {
        self.records
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or(ReviewError::NotFound(Entity::PullRequest))
    }

    async fn reviews_for(&self, user_id: &UserId) -> Result<Vec<PullRequest>, ReviewError> {
        let records = self.records.lock().await;
        let mut reviews: Vec<PullRequest> = records
            .values()
            .filter(|record| record.assigned_reviewers.contains(user_id))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }
}
