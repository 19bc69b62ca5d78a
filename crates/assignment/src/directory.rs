use std::{collections::BTreeSet, sync::Arc};

use shared::{
    domain::{TeamId, UserId},
    error::{ConflictKind, Entity, ReviewError},
};
use tracing::debug;

use crate::{sampling::ReviewerSampler, store::MembershipStore};

/// Read-only eligibility queries over team membership.
#[derive(Clone)]
pub struct TeamDirectory {
    members: Arc<dyn MembershipStore>,
    sampler: Arc<dyn ReviewerSampler>,
}

impl TeamDirectory {
    pub fn new(members: Arc<dyn MembershipStore>, sampler: Arc<dyn ReviewerSampler>) -> Self {
        Self { members, sampler }
    }

    pub async fn team_of(&self, user_id: &UserId) -> Result<TeamId, ReviewError> {
        self.members
            .team_of(user_id)
            .await?
            .ok_or(ReviewError::NotFound(Entity::User))
    }

    /// Up to `count` distinct active members of the team other than
    /// `exclude_user_id`. A short team yields fewer ids, never an error.
    pub async fn sample_reviewers(
        &self,
        team_id: TeamId,
        exclude_user_id: &UserId,
        count: usize,
    ) -> Result<BTreeSet<UserId>, ReviewError> {
        let candidates = self
            .members
            .active_members(team_id, std::slice::from_ref(exclude_user_id))
            .await?;
        debug!(%team_id, candidates = candidates.len(), count, "sampling reviewers");

        Ok(self
            .sampler
            .sample(candidates, count)
            .into_iter()
            .take(count)
            .collect())
    }

    /// One active member of the team outside `exclude_user_ids`.
    pub async fn sample_replacement(
        &self,
        team_id: TeamId,
        exclude_user_ids: &[UserId],
    ) -> Result<UserId, ReviewError> {
        let candidates = self
            .members
            .active_members(team_id, exclude_user_ids)
            .await?;
        debug!(%team_id, candidates = candidates.len(), "sampling replacement");

        self.sampler
            .sample(candidates, 1)
            .into_iter()
            .next()
            .ok_or(ReviewError::Conflict(ConflictKind::NoCandidate))
    }
}
