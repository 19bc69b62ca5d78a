use std::collections::BTreeSet;

use async_trait::async_trait;
use shared::{
    domain::{NewPullRequest, PullRequest, PullRequestId, TeamId, UserId},
    error::ReviewError,
};

/// Read side of team membership consumed by [`crate::TeamDirectory`].
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Team the user currently belongs to, if any.
    async fn team_of(&self, user_id: &UserId) -> Result<Option<TeamId>, ReviewError>;

    /// Active members of `team_id` that are not listed in `excluded`.
    ///
    /// The activity flag and the exclusion list must be applied within one
    /// read so no returned id is inactive or excluded as of that read.
    async fn active_members(
        &self,
        team_id: TeamId,
        excluded: &[UserId],
    ) -> Result<Vec<UserId>, ReviewError>;
}

/// Sole writer of pull-request records.
///
/// Every mutating method is one all-or-nothing unit: either the returned
/// record is committed or nothing is.
#[async_trait]
pub trait PullRequestLedger: Send + Sync {
    /// Opens a pull request with the given reviewers.
    ///
    /// Fails with `Conflict(AlreadyExists)` when the id is taken; the
    /// existence check and the insert are one atomic step.
    async fn create(
        &self,
        draft: NewPullRequest,
        reviewer_ids: BTreeSet<UserId>,
    ) -> Result<PullRequest, ReviewError>;

    /// Moves the pull request to MERGED. Merging a merged pull request
    /// returns the stored record untouched.
    async fn merge(&self, id: &PullRequestId) -> Result<PullRequest, ReviewError>;

    /// Swaps `old_reviewer_id` for `new_reviewer_id` on an open pull request.
    async fn reassign(
        &self,
        id: &PullRequestId,
        old_reviewer_id: &UserId,
        new_reviewer_id: &UserId,
    ) -> Result<PullRequest, ReviewError>;

    async fn find(&self, id: &PullRequestId) -> Result<PullRequest, ReviewError>;

    /// Pull requests the user is assigned to review, newest first.
    async fn reviews_for(&self, user_id: &UserId) -> Result<Vec<PullRequest>, ReviewError>;
}
