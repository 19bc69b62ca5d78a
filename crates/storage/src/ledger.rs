//! SQLite realization of [`PullRequestLedger`].
//!
//! Each mutating transaction starts with its write statement. SQLite takes
//! the database write lock on that first statement, so the checks that follow
//! observe a state no concurrent writer can change before commit. Returning
//! early drops the transaction, which rolls it back.

use std::collections::BTreeSet;

use assignment::PullRequestLedger;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{NewPullRequest, PullRequest, PullRequestId, PullRequestStatus, UserId},
    error::{ConflictKind, Entity, ReviewError},
};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};
use tracing::{debug, info};

use crate::Storage;

#[async_trait]
impl PullRequestLedger for Storage {
    async fn create(
        &self,
        draft: NewPullRequest,
        reviewer_ids: BTreeSet<UserId>,
    ) -> Result<PullRequest, ReviewError> {
        debug!(
            pull_request_id = %draft.id,
            author_id = %draft.author_id,
            reviewers = ?reviewer_ids,
            "creating pull request"
        );
        let mut tx = self.pool.begin().await.map_err(ReviewError::internal)?;

        let inserted: Option<String> = sqlx::query_scalar(
            "INSERT INTO pull_requests (pull_request_id, name, author_id, status, created_at)
             VALUES (?, ?, ?, 'OPEN', ?)
             ON CONFLICT(pull_request_id) DO NOTHING
             RETURNING pull_request_id",
        )
        .bind(draft.id.as_str())
        .bind(&draft.name)
        .bind(draft.author_id.as_str())
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(ReviewError::internal)?;
        if inserted.is_none() {
            return Err(ReviewError::Conflict(ConflictKind::AlreadyExists));
        }

        for reviewer_id in &reviewer_ids {
            sqlx::query(
                "INSERT INTO pull_request_reviewers (pull_request_id, reviewer_id) VALUES (?, ?)",
            )
            .bind(draft.id.as_str())
            .bind(reviewer_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(ReviewError::internal)?;
        }

        let created = load_existing(&mut tx, &draft.id).await?;
        tx.commit().await.map_err(ReviewError::internal)?;
        Ok(created)
    }

    async fn merge(&self, id: &PullRequestId) -> Result<PullRequest, ReviewError> {
        debug!(pull_request_id = %id, "merging pull request");
        let mut tx = self.pool.begin().await.map_err(ReviewError::internal)?;

        let transitioned = sqlx::query(
            "UPDATE pull_requests
             SET status = 'MERGED', merged_at = ?
             WHERE pull_request_id = ? AND status = 'OPEN'",
        )
        .bind(Utc::now())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(ReviewError::internal)?
        .rows_affected()
            > 0;

        let merged = load_existing(&mut tx, id).await?;
        tx.commit().await.map_err(ReviewError::internal)?;
        if !transitioned {
            info!(pull_request_id = %id, "pull request already merged");
        }
        Ok(merged)
    }

    async fn reassign(
        &self,
        id: &PullRequestId,
        old_reviewer_id: &UserId,
        new_reviewer_id: &UserId,
    ) -> Result<PullRequest, ReviewError> {
        debug!(
            pull_request_id = %id,
            %old_reviewer_id,
            %new_reviewer_id,
            "reassigning reviewer"
        );
        let mut tx = self.pool.begin().await.map_err(ReviewError::internal)?;

        let removed = sqlx::query(
            "DELETE FROM pull_request_reviewers
             WHERE pull_request_id = ? AND reviewer_id = ?
               AND EXISTS (
                   SELECT 1 FROM pull_requests
                   WHERE pull_request_id = ? AND status = 'OPEN'
               )",
        )
        .bind(id.as_str())
        .bind(old_reviewer_id.as_str())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(ReviewError::internal)?
        .rows_affected();

        if removed == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM pull_requests WHERE pull_request_id = ?")
                    .bind(id.as_str())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(ReviewError::internal)?;
            return Err(match status.as_deref().and_then(PullRequestStatus::parse) {
                None => ReviewError::NotFound(Entity::PullRequest),
                Some(PullRequestStatus::Merged) => {
                    ReviewError::Conflict(ConflictKind::AlreadyMerged)
                }
                Some(PullRequestStatus::Open) => ReviewError::Conflict(ConflictKind::NotAssigned),
            });
        }

        sqlx::query(
            "INSERT INTO pull_request_reviewers (pull_request_id, reviewer_id) VALUES (?, ?)
             ON CONFLICT(pull_request_id, reviewer_id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(new_reviewer_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(ReviewError::internal)?;

        let updated = load_existing(&mut tx, id).await?;
        tx.commit().await.map_err(ReviewError::internal)?;
        Ok(updated)
    }

    async fn find(&self, id: &PullRequestId) -> Result<PullRequest, ReviewError> {
        let mut conn = self.pool.acquire().await.map_err(ReviewError::internal)?;
        load_existing(&mut conn, id).await
    }

    async fn reviews_for(&self, user_id: &UserId) -> Result<Vec<PullRequest>, ReviewError> {
        debug!(%user_id, "listing reviews");
        let mut conn = self.pool.acquire().await.map_err(ReviewError::internal)?;

        let rows = sqlx::query(
            "SELECT pr.pull_request_id, pr.name, pr.author_id, pr.status, pr.merged_at, pr.created_at
             FROM pull_requests pr
             INNER JOIN pull_request_reviewers prr ON prr.pull_request_id = pr.pull_request_id
             WHERE prr.reviewer_id = ?
             ORDER BY pr.pull_request_id ASC",
        )
        .bind(user_id.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(ReviewError::internal)?;

        let mut reviews = Vec::with_capacity(rows.len());
        for row in rows {
            let id = PullRequestId(row.get::<String, _>(0));
            let reviewers = load_reviewers(&mut conn, &id)
                .await
                .map_err(ReviewError::internal)?;
            reviews.push(decode_pull_request(&row, reviewers).map_err(ReviewError::internal)?);
        }
        // Timestamps are stored as text, so order on the decoded values.
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }
}

async fn load_existing(
    conn: &mut SqliteConnection,
    id: &PullRequestId,
) -> Result<PullRequest, ReviewError> {
    load_pull_request(conn, id)
        .await
        .map_err(ReviewError::internal)?
        .ok_or(ReviewError::NotFound(Entity::PullRequest))
}

async fn load_pull_request(
    conn: &mut SqliteConnection,
    id: &PullRequestId,
) -> Result<Option<PullRequest>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT pull_request_id, name, author_id, status, merged_at, created_at
         FROM pull_requests
         WHERE pull_request_id = ?",
    )
    .bind(id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let reviewers = load_reviewers(conn, id).await?;
    decode_pull_request(&row, reviewers).map(Some)
}

async fn load_reviewers(
    conn: &mut SqliteConnection,
    id: &PullRequestId,
) -> Result<BTreeSet<UserId>, sqlx::Error> {
    let reviewers: Vec<String> = sqlx::query_scalar(
        "SELECT reviewer_id FROM pull_request_reviewers WHERE pull_request_id = ?",
    )
    .bind(id.as_str())
    .fetch_all(&mut *conn)
    .await?;
    Ok(reviewers.into_iter().map(UserId).collect())
}

fn decode_pull_request(
    row: &SqliteRow,
    assigned_reviewers: BTreeSet<UserId>,
) -> Result<PullRequest, sqlx::Error> {
    let raw_status = row.try_get::<String, _>("status")?;
    let status = PullRequestStatus::parse(&raw_status).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown pull request status '{raw_status}'").into())
    })?;

    Ok(PullRequest {
        id: PullRequestId(row.try_get::<String, _>("pull_request_id")?),
        name: row.try_get::<String, _>("name")?,
        author_id: UserId(row.try_get::<String, _>("author_id")?),
        status,
        assigned_reviewers,
        merged_at: row.try_get::<Option<DateTime<Utc>>, _>("merged_at")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
