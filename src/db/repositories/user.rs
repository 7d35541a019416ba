//! User repository
//!
//! Database operations for portal users.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::User;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Count total users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_USER: &str =
    "SELECT id, username, email, password_hash, role, created_at, updated_at FROM users";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl SqlxUserRepository {
    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("{} WHERE {} = ?", SELECT_USER, column);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, UserRow>(sql).bind(value).fetch_optional(pool).await
        })
        .with_context(|| format!("Failed to get user by {}", column))?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO users (username, email, password_hash, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.role.to_string())
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create user")?;

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("{} WHERE id = ?", SELECT_USER);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, UserRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get user by id")?;
        row.map(User::try_from).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email).await
    }

    async fn count(&self) -> Result<i64> {
        on_backend!(self.pool, "SELECT COUNT(*) FROM users", |pool, sql| {
            sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
        })
        .context("Failed to count users")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::models::UserRole;

    fn user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "$argon2id$v=19$hash".to_string(),
            UserRole::Editor,
        )
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = SqlxUserRepository::new(migrated_pool().await);
        let created = repo.create(&user("ana", "ana@example.com")).await.unwrap();
        assert!(created.id > 0);

        let by_name = repo.get_by_username("ana").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.password_hash, "$argon2id$v=19$hash");
        assert_eq!(by_name.role, UserRole::Editor);

        let by_email = repo.get_by_email("ana@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.username, "ana");
        assert!(repo.get_by_id(created.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_username_and_count() {
        let repo = SqlxUserRepository::new(migrated_pool().await);
        assert_eq!(repo.count().await.unwrap(), 0);
        repo.create(&user("ana", "ana@example.com")).await.unwrap();
        assert!(repo.create(&user("ana", "other@example.com")).await.is_err());
        assert!(repo.create(&user("bo", "ana@example.com")).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
