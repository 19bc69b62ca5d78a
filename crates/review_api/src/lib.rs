use std::sync::Arc;

use assignment::{
    PullRequestLedger, RandomSampler, Reassignment, ReviewAssignmentEngine, ReviewerSampler,
    TeamDirectory,
};
use shared::{
    domain::{PullRequest, PullRequestId, Team, UserId, UserWithTeam},
    error::{ApiError, ErrorCode, ReviewError},
    protocol::{
        AddTeamRequest, CreatePullRequestRequest, HealthResponse, MergePullRequestRequest,
        ReassignResponse, ReassignReviewerRequest, ReviewsQuery, ReviewsResponse,
        SetIsActiveRequest, TeamQuery,
    },
};
use storage::Storage;
use tracing::debug;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub engine: ReviewAssignmentEngine,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self::with_sampler(storage, Arc::new(RandomSampler))
    }

    /// Wires the engine over `storage`, drawing reviewers with `sampler`.
    pub fn with_sampler(storage: Storage, sampler: Arc<dyn ReviewerSampler>) -> Self {
        let directory = TeamDirectory::new(Arc::new(storage.clone()), sampler);
        let engine = ReviewAssignmentEngine::new(directory, Arc::new(storage.clone()));
        Self { storage, engine }
    }
}

pub async fn health(ctx: &ApiContext) -> Result<HealthResponse, ApiError> {
    ctx.storage.health_check().await.map_err(internal)?;
    Ok(HealthResponse {
        status: "ok".into(),
    })
}

pub async fn add_team(ctx: &ApiContext, request: AddTeamRequest) -> Result<Team, ApiError> {
    let team_name = required("team_name", &request.team_name)?;
    if request.members.is_empty() {
        return Err(ReviewError::Validation("members must not be empty".into()).into());
    }
    for member in &request.members {
        required("user_id", member.user_id.as_str())?;
        required("username", &member.username)?;
    }

    Ok(ctx.storage.add_team(team_name, &request.members).await?)
}

pub async fn get_team(ctx: &ApiContext, query: TeamQuery) -> Result<Team, ApiError> {
    let team_name = required_param("team_name", query.team_name.as_deref())?;
    Ok(ctx.storage.get_team(team_name).await?)
}

pub async fn set_is_active(
    ctx: &ApiContext,
    request: SetIsActiveRequest,
) -> Result<UserWithTeam, ApiError> {
    let user_id = UserId::from(required("user_id", &request.user_id)?);
    Ok(ctx.storage.set_is_active(&user_id, request.is_active).await?)
}

pub async fn user_reviews(
    ctx: &ApiContext,
    query: ReviewsQuery,
) -> Result<ReviewsResponse, ApiError> {
    let user_id = UserId::from(required_param("user_id", query.user_id.as_deref())?);
    let pull_requests = ctx.engine.ledger().reviews_for(&user_id).await?;
    debug!(%user_id, count = pull_requests.len(), "listed reviews");
    Ok(ReviewsResponse {
        user_id,
        pull_requests,
    })
}

pub async fn create_pull_request(
    ctx: &ApiContext,
    request: CreatePullRequestRequest,
) -> Result<PullRequest, ApiError> {
    let id = PullRequestId::from(required("pull_request_id", &request.pull_request_id)?);
    let name = required("pull_request_name", &request.pull_request_name)?;
    let author_id = UserId::from(required("author_id", &request.author_id)?);

    Ok(ctx.engine.create(author_id, id, name.to_string()).await?)
}

pub async fn merge_pull_request(
    ctx: &ApiContext,
    request: MergePullRequestRequest,
) -> Result<PullRequest, ApiError> {
    let id = PullRequestId::from(required("pull_request_id", &request.pull_request_id)?);
    Ok(ctx.engine.merge(&id).await?)
}

pub async fn reassign_reviewer(
    ctx: &ApiContext,
    request: ReassignReviewerRequest,
) -> Result<ReassignResponse, ApiError> {
    let id = PullRequestId::from(required("pull_request_id", &request.pull_request_id)?);
    let old_reviewer_id = UserId::from(required("old_reviewer_id", &request.old_reviewer_id)?);

    let Reassignment {
        pull_request,
        replaced_by,
    } = ctx.engine.reassign(&id, &old_reviewer_id).await?;
    Ok(ReassignResponse {
        pr: pull_request,
        replaced_by,
    })
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    if value.trim().is_empty() {
        return Err(ReviewError::Validation(format!("{field} is required")).into());
    }
    Ok(value)
}

fn required_param<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, ApiError> {
    required(field, value.unwrap_or_default())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}
