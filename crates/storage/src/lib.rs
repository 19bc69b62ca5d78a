use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

use shared::{
    domain::{Team, TeamId, User, UserId, UserWithTeam},
    error::{ConflictKind, Entity, ReviewError},
};

mod directory;
mod ledger;

/// SQLite-backed persistence for teams, users and pull requests.
///
/// Implements [`assignment::MembershipStore`] and
/// [`assignment::PullRequestLedger`]; cloning shares the pool.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let in_memory = is_in_memory(database_url);
        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` is its own database, so the pool
        // must hold exactly one connection and never recycle it.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Creates a team and binds every member to it.
    ///
    /// Members are upserted: an existing user gets the supplied username and
    /// activity flag and is moved out of any previous team.
    pub async fn add_team(&self, name: &str, members: &[User]) -> Result<Team, ReviewError> {
        debug!(team_name = name, members = members.len(), "adding team");
        let mut tx = self.pool.begin().await.map_err(ReviewError::internal)?;

        let team_id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO teams (name) VALUES (?)
             ON CONFLICT(name) DO NOTHING
             RETURNING id",
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ReviewError::internal)?;
        let Some(team_id) = team_id.map(TeamId) else {
            return Err(ReviewError::Conflict(ConflictKind::TeamExists));
        };

        for member in members {
            sqlx::query(
                "INSERT INTO users (user_id, username, is_active) VALUES (?, ?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET username = excluded.username, is_active = excluded.is_active",
            )
            .bind(member.user_id.as_str())
            .bind(&member.username)
            .bind(member.is_active)
            .execute(&mut *tx)
            .await
            .map_err(ReviewError::internal)?;

            sqlx::query(
                "INSERT INTO team_members (user_id, team_id) VALUES (?, ?)
                 ON CONFLICT(user_id) DO UPDATE SET team_id = excluded.team_id",
            )
            .bind(member.user_id.as_str())
            .bind(team_id.0)
            .execute(&mut *tx)
            .await
            .map_err(ReviewError::internal)?;
        }

        let members = list_team_members(&mut tx, team_id)
            .await
            .map_err(ReviewError::internal)?;
        tx.commit().await.map_err(ReviewError::internal)?;

        Ok(Team {
            team_id,
            name: name.to_string(),
            members,
        })
    }

    pub async fn get_team(&self, name: &str) -> Result<Team, ReviewError> {
        debug!(team_name = name, "loading team");
        let mut conn = self.pool.acquire().await.map_err(ReviewError::internal)?;

        let row = sqlx::query("SELECT id, name FROM teams WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(ReviewError::internal)?
            .ok_or(ReviewError::NotFound(Entity::Team))?;
        let team_id = TeamId(row.get::<i64, _>(0));
        let members = list_team_members(&mut conn, team_id)
            .await
            .map_err(ReviewError::internal)?;

        Ok(Team {
            team_id,
            name: row.get::<String, _>(1),
            members,
        })
    }

    /// Toggles a user's activity flag and returns the user with their team.
    pub async fn set_is_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<UserWithTeam, ReviewError> {
        debug!(%user_id, is_active, "setting user activity");
        let mut tx = self.pool.begin().await.map_err(ReviewError::internal)?;

        let updated = sqlx::query("UPDATE users SET is_active = ? WHERE user_id = ?")
            .bind(is_active)
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(ReviewError::internal)?
            .rows_affected();
        if updated == 0 {
            return Err(ReviewError::NotFound(Entity::User));
        }

        let row = sqlx::query(
            "SELECT u.user_id, u.username, u.is_active, COALESCE(t.name, '')
             FROM users u
             LEFT JOIN team_members tm ON tm.user_id = u.user_id
             LEFT JOIN teams t ON t.id = tm.team_id
             WHERE u.user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(ReviewError::internal)?;
        tx.commit().await.map_err(ReviewError::internal)?;

        Ok(UserWithTeam {
            user_id: UserId(row.get::<String, _>(0)),
            username: row.get::<String, _>(1),
            is_active: row.get::<bool, _>(2),
            team_name: row.get::<String, _>(3),
        })
    }
}

async fn list_team_members(
    conn: &mut sqlx::SqliteConnection,
    team_id: TeamId,
) -> Result<Vec<User>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT u.user_id, u.username, u.is_active
         FROM users u
         INNER JOIN team_members tm ON tm.user_id = u.user_id
         WHERE tm.team_id = ?
         ORDER BY u.user_id ASC",
    )
    .bind(team_id.0)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| User {
            user_id: UserId(r.get::<String, _>(0)),
            username: r.get::<String, _>(1),
            is_active: r.get::<bool, _>(2),
        })
        .collect())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
