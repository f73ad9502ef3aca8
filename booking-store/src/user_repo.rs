use async_trait::async_trait;
use booking_domain::repository::RepoResult;
use booking_domain::{RepositoryError, User, UserRepository};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::repo_error;

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            name: row.name,
            role: row.role,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &User) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, role, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("user", e))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<User> {
        let row: UserRow = sqlx::query_as(
            "SELECT id, email, name, role, active, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| repo_error("user", e))?;
        Ok(row.into())
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, name, role, active, created_at, updated_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| repo_error("user", e))?;
        Ok(row.map(User::from))
    }

    async fn update(&self, user: &User) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email = $2, name = $3, role = $4, active = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.role)
        .bind(user.active)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| repo_error("user", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("user"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| repo_error("user", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("user"));
        }
        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> RepoResult<(Vec<User>, i64)> {
        let rows: Vec<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, name, role, active, created_at, updated_at
              FROM users
             ORDER BY created_at DESC
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| repo_error("user", e))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| repo_error("user", e))?;

        Ok((rows.into_iter().map(User::from).collect(), total))
    }
}
