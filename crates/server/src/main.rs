use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use review_api::ApiContext;
use shared::{
    error::{ApiError, ErrorCode, ErrorResponse},
    protocol::{
        AddTeamRequest, CreatePullRequestRequest, HealthResponse, MergePullRequestRequest,
        PullRequestResponse, ReassignResponse, ReassignReviewerRequest, ReviewsQuery,
        ReviewsResponse, SetIsActiveRequest, TeamQuery, TeamResponse, UserResponse,
    },
};
use storage::Storage;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiFailure = (StatusCode, Json<ErrorResponse>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings()?;
    let filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = settings.database_url.clone();
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify the path is writable"
        );
        error
    })?;
    let state = AppState {
        api: ApiContext::new(storage),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(http_health))
        .route("/api/v1/team/add", post(http_add_team))
        .route("/api/v1/team/get", get(http_get_team))
        .route("/api/v1/users/setIsActive", post(http_set_is_active))
        .route("/api/v1/users/getReview", get(http_user_reviews))
        .route("/api/v1/pullRequest/create", post(http_create_pull_request))
        .route("/api/v1/pullRequest/merge", post(http_merge_pull_request))
        .route("/api/v1/pullRequest/reassign", post(http_reassign_reviewer))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::PrExists
        | ErrorCode::NoCandidate
        | ErrorCode::PrMerged
        | ErrorCode::NotAssigned => StatusCode::CONFLICT,
        ErrorCode::TeamExists | ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: ApiError) -> ApiFailure {
    let status = status_for(err.code);
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(ErrorResponse { error: err }))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiFailure> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        let error = ApiError::new(ErrorCode::Validation, rejection.body_text());
        (status, Json(ErrorResponse { error }))
    })
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiFailure> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| failure(ApiError::new(ErrorCode::Validation, rejection.body_text())))
}

async fn http_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiFailure> {
    review_api::health(&state.api)
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_add_team(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddTeamRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TeamResponse>), ApiFailure> {
    let request = json_body(payload)?;
    let team = review_api::add_team(&state.api, request)
        .await
        .map_err(failure)?;
    Ok((StatusCode::CREATED, Json(TeamResponse { team })))
}

async fn http_get_team(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<TeamResponse>, ApiFailure> {
    let query = query_params(query)?;
    let team = review_api::get_team(&state.api, query)
        .await
        .map_err(failure)?;
    Ok(Json(TeamResponse { team }))
}

async fn http_set_is_active(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetIsActiveRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiFailure> {
    let request = json_body(payload)?;
    let user = review_api::set_is_active(&state.api, request)
        .await
        .map_err(failure)?;
    Ok(Json(UserResponse { user }))
}

async fn http_user_reviews(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReviewsQuery>, QueryRejection>,
) -> Result<Json<ReviewsResponse>, ApiFailure> {
    let query = query_params(query)?;
    review_api::user_reviews(&state.api, query)
        .await
        .map(Json)
        .map_err(failure)
}

async fn http_create_pull_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePullRequestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PullRequestResponse>), ApiFailure> {
    let request = json_body(payload)?;
    let pr = review_api::create_pull_request(&state.api, request)
        .await
        .map_err(failure)?;
    Ok((StatusCode::CREATED, Json(PullRequestResponse { pr })))
}

async fn http_merge_pull_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MergePullRequestRequest>, JsonRejection>,
) -> Result<Json<PullRequestResponse>, ApiFailure> {
    let request = json_body(payload)?;
    let pr = review_api::merge_pull_request(&state.api, request)
        .await
        .map_err(failure)?;
    Ok(Json(PullRequestResponse { pr }))
}

async fn http_reassign_reviewer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReassignReviewerRequest>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiFailure> {
    let request = json_body(payload)?;
    review_api::reassign_reviewer(&state.api, request)
        .await
        .map(Json)
        .map_err(failure)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
