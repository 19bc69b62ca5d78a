use assignment::MembershipStore;
use async_trait::async_trait;
use shared::{
    domain::{TeamId, UserId},
    error::ReviewError,
};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::Storage;

#[async_trait]
impl MembershipStore for Storage {
    async fn team_of(&self, user_id: &UserId) -> Result<Option<TeamId>, ReviewError> {
        debug!(%user_id, "resolving team");
        let team_id: Option<i64> =
            sqlx::query_scalar("SELECT team_id FROM team_members WHERE user_id = ?")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(ReviewError::internal)?;
        Ok(team_id.map(TeamId))
    }

    async fn active_members(
        &self,
        team_id: TeamId,
        excluded: &[UserId],
    ) -> Result<Vec<UserId>, ReviewError> {
        debug!(%team_id, excluded = excluded.len(), "listing eligible members");
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT u.user_id
             FROM users u
             INNER JOIN team_members tm ON tm.user_id = u.user_id
             WHERE u.is_active = 1 AND tm.team_id = ",
        );
        query.push_bind(team_id.0);
        if !excluded.is_empty() {
            query.push(" AND u.user_id NOT IN (");
            let mut separated = query.separated(", ");
            for user_id in excluded {
                separated.push_bind(user_id.0.clone());
            }
            separated.push_unseparated(")");
        }
        query.push(" ORDER BY u.user_id ASC");

        let ids = query
            .build_query_scalar::<String>()
            .fetch_all(&self.pool)
            .await
            .map_err(ReviewError::internal)?;
        Ok(ids.into_iter().map(UserId).collect())
    }
}
