use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    PrExists,
    NoCandidate,
    PrMerged,
    NotAssigned,
    TeamExists,
    #[serde(rename = "INVALID_REQUEST")]
    Validation,
    #[serde(rename = "INTERNAL_ERROR")]
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Wire envelope: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Author,
    Reviewer,
    PullRequest,
    Team,
    User,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Author => "author or team",
            Self::Reviewer => "reviewer",
            Self::PullRequest => "pull request",
            Self::Team => "team",
            Self::User => "user",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    AlreadyExists,
    NoCandidate,
    AlreadyMerged,
    NotAssigned,
    TeamExists,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyExists => "PR id already exists",
            Self::NoCandidate => "no active replacement candidate in team",
            Self::AlreadyMerged => "cannot reassign on merged PR",
            Self::NotAssigned => "reviewer is not assigned to this PR",
            Self::TeamExists => "team_name already exists",
        })
    }
}

/// Failure kinds raised by the review core and its storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(Entity),
    #[error("{0}")]
    Conflict(ConflictKind),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReviewError {
    pub fn internal(err: impl fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// Re-labels a `NotFound` with the entity the caller was resolving.
    pub fn missing_as(self, entity: Entity) -> Self {
        match self {
            Self::NotFound(_) => Self::NotFound(entity),
            other => other,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict(ConflictKind::AlreadyExists) => ErrorCode::PrExists,
            Self::Conflict(ConflictKind::NoCandidate) => ErrorCode::NoCandidate,
            Self::Conflict(ConflictKind::AlreadyMerged) => ErrorCode::PrMerged,
            Self::Conflict(ConflictKind::NotAssigned) => ErrorCode::NotAssigned,
            Self::Conflict(ConflictKind::TeamExists) => ErrorCode::TeamExists,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<ReviewError> for ApiError {
    fn from(value: ReviewError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_to_wire_names() {
        let encoded = serde_json::to_string(&ErrorCode::Validation).expect("json");
        assert_eq!(encoded, "\"INVALID_REQUEST\"");
        let encoded = serde_json::to_string(&ErrorCode::PrMerged).expect("json");
        assert_eq!(encoded, "\"PR_MERGED\"");
    }

    #[test]
    fn not_found_relabel_keeps_other_kinds() {
        let relabelled = ReviewError::NotFound(Entity::User).missing_as(Entity::Author);
        assert_eq!(relabelled, ReviewError::NotFound(Entity::Author));
        assert_eq!(relabelled.to_string(), "author or team not found");

        let conflict = ReviewError::Conflict(ConflictKind::NoCandidate).missing_as(Entity::Author);
        assert_eq!(conflict, ReviewError::Conflict(ConflictKind::NoCandidate));
    }
}
