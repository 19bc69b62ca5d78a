use std::sync::Arc;

use shared::{
    domain::{NewPullRequest, PullRequest, PullRequestId, UserId},
    error::{Entity, ReviewError},
};
use tracing::{info, warn};

use crate::{directory::TeamDirectory, store::PullRequestLedger};

/// Reviewers requested for every new pull request.
pub const REVIEWERS_PER_PULL_REQUEST: usize = 2;

/// Result of a successful reviewer swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub pull_request: PullRequest,
    pub replaced_by: UserId,
}

/// Create, merge and reassign flows over a directory and a ledger.
#[derive(Clone)]
pub struct ReviewAssignmentEngine {
    directory: TeamDirectory,
    ledger: Arc<dyn PullRequestLedger>,
}

impl ReviewAssignmentEngine {
    pub fn new(directory: TeamDirectory, ledger: Arc<dyn PullRequestLedger>) -> Self {
        Self { directory, ledger }
    }

    pub fn ledger(&self) -> &Arc<dyn PullRequestLedger> {
        &self.ledger
    }

    pub async fn create(
        &self,
        author_id: UserId,
        id: PullRequestId,
        name: String,
    ) -> Result<PullRequest, ReviewError> {
        let team_id = self
            .directory
            .team_of(&author_id)
            .await
            .map_err(|err| err.missing_as(Entity::Author))?;
        let reviewer_ids = self
            .directory
            .sample_reviewers(team_id, &author_id, REVIEWERS_PER_PULL_REQUEST)
            .await?;

        let created = self
            .ledger
            .create(
                NewPullRequest {
                    id,
                    name,
                    author_id,
                },
                reviewer_ids,
            )
            .await?;
        info!(
            pull_request_id = %created.id,
            author_id = %created.author_id,
            reviewers = created.assigned_reviewers.len(),
            "pull request created"
        );
        Ok(created)
    }

    pub async fn merge(&self, id: &PullRequestId) -> Result<PullRequest, ReviewError> {
        let merged = self.ledger.merge(id).await?;
        info!(pull_request_id = %merged.id, "pull request merged");
        Ok(merged)
    }

    /// Replaces `old_reviewer_id` with an active member of the old
    /// reviewer's own team. The author is always kept out of the pool.
    pub async fn reassign(
        &self,
        id: &PullRequestId,
        old_reviewer_id: &UserId,
    ) -> Result<Reassignment, ReviewError> {
        let team_id = self
            .directory
            .team_of(old_reviewer_id)
            .await
            .map_err(|err| err.missing_as(Entity::Reviewer))?;
        let current = self.ledger.find(id).await?;

        let excluded = [old_reviewer_id.clone(), current.author_id.clone()];
        let replacement = self
            .directory
            .sample_replacement(team_id, &excluded)
            .await
            .inspect_err(|err| {
                warn!(pull_request_id = %id, %old_reviewer_id, %err, "no replacement reviewer");
            })?;

        let updated = self
            .ledger
            .reassign(id, old_reviewer_id, &replacement)
            .await?;
        info!(
            pull_request_id = %id,
            %old_reviewer_id,
            new_reviewer_id = %replacement,
            "reviewer reassigned"
        );
        Ok(Reassignment {
            pull_request: updated,
            replaced_by: replacement,
        })
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
