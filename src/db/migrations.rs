//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings, one dialect per
//! backend, and tracked in the `_migrations` table.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::{postgres_sql, Backend, DynDatabasePool};
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and Postgres
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, ascending)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_postgres: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i32,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'editor',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_settings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS settings (
                key VARCHAR(100) PRIMARY KEY,
                value TEXT NOT NULL
            );
            INSERT INTO settings (key, value) VALUES ('site_name', 'Townsquare') ON CONFLICT (key) DO NOTHING;
            INSERT INTO settings (key, value) VALUES ('site_tagline', 'Your neighborhood, up close') ON CONFLICT (key) DO NOTHING;
            INSERT INTO settings (key, value) VALUES ('contact_email', '') ON CONFLICT (key) DO NOTHING;
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS settings (
                key VARCHAR(100) PRIMARY KEY,
                value TEXT NOT NULL
            );
            INSERT INTO settings (key, value) VALUES ('site_name', 'Townsquare') ON CONFLICT (key) DO NOTHING;
            INSERT INTO settings (key, value) VALUES ('site_tagline', 'Your neighborhood, up close') ON CONFLICT (key) DO NOTHING;
            INSERT INTO settings (key, value) VALUES ('contact_email', '') ON CONFLICT (key) DO NOTHING;
        "#,
    },
    Migration {
        version: 4,
        name: "create_cities",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS cities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                state VARCHAR(50) NOT NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS cities (
                id BIGSERIAL PRIMARY KEY,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                state VARCHAR(50) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
        "#,
    },
    Migration {
        version: 5,
        name: "create_areas",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS areas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city_id INTEGER NOT NULL,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (city_id) REFERENCES cities(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_areas_city_id ON areas(city_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS areas (
                id BIGSERIAL PRIMARY KEY,
                city_id BIGINT NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_areas_city_id ON areas(city_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_neighborhoods",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS neighborhoods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                area_id INTEGER NOT NULL,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                hero_image_url TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (area_id) REFERENCES areas(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_neighborhoods_area_id ON neighborhoods(area_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS neighborhoods (
                id BIGSERIAL PRIMARY KEY,
                area_id BIGINT NOT NULL REFERENCES areas(id) ON DELETE CASCADE,
                slug VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(100) NOT NULL,
                description TEXT,
                hero_image_url TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_neighborhoods_area_id ON neighborhoods(area_id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_business_listings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS business_listings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                neighborhood_id INTEGER,
                slug VARCHAR(150) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                description TEXT,
                category VARCHAR(100),
                address TEXT,
                phone VARCHAR(50),
                website TEXT,
                email VARCHAR(255),
                tier VARCHAR(20) NOT NULL DEFAULT 'free',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (neighborhood_id) REFERENCES neighborhoods(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_listings_neighborhood_id ON business_listings(neighborhood_id);
            CREATE INDEX IF NOT EXISTS idx_listings_status ON business_listings(status);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS business_listings (
                id BIGSERIAL PRIMARY KEY,
                neighborhood_id BIGINT REFERENCES neighborhoods(id) ON DELETE SET NULL,
                slug VARCHAR(150) NOT NULL UNIQUE,
                name VARCHAR(200) NOT NULL,
                description TEXT,
                category VARCHAR(100),
                address TEXT,
                phone VARCHAR(50),
                website TEXT,
                email VARCHAR(255),
                tier VARCHAR(20) NOT NULL DEFAULT 'free',
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_listings_neighborhood_id ON business_listings(neighborhood_id);
            CREATE INDEX IF NOT EXISTS idx_listings_status ON business_listings(status);
        "#,
    },
    Migration {
        version: 8,
        name: "create_events",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                neighborhood_id INTEGER,
                business_listing_id INTEGER,
                slug VARCHAR(150) NOT NULL UNIQUE,
                title VARCHAR(200) NOT NULL,
                description TEXT,
                venue TEXT,
                starts_at TIMESTAMP NOT NULL,
                ends_at TIMESTAMP,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (neighborhood_id) REFERENCES neighborhoods(id) ON DELETE SET NULL,
                FOREIGN KEY (business_listing_id) REFERENCES business_listings(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_starts_at ON events(starts_at);
            CREATE INDEX IF NOT EXISTS idx_events_neighborhood_id ON events(neighborhood_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS events (
                id BIGSERIAL PRIMARY KEY,
                neighborhood_id BIGINT REFERENCES neighborhoods(id) ON DELETE SET NULL,
                business_listing_id BIGINT REFERENCES business_listings(id) ON DELETE SET NULL,
                slug VARCHAR(150) NOT NULL UNIQUE,
                title VARCHAR(200) NOT NULL,
                description TEXT,
                venue TEXT,
                starts_at TIMESTAMPTZ NOT NULL,
                ends_at TIMESTAMPTZ,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_starts_at ON events(starts_at);
            CREATE INDEX IF NOT EXISTS idx_events_neighborhood_id ON events(neighborhood_id);
        "#,
    },
    Migration {
        version: 9,
        name: "create_blog_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                excerpt TEXT,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                cover_image_url TEXT,
                author_id INTEGER,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blog_posts_status ON blog_posts(status);
            CREATE TABLE IF NOT EXISTS post_businesses (
                post_id INTEGER NOT NULL,
                business_listing_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, business_listing_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (business_listing_id) REFERENCES business_listings(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS post_neighborhoods (
                post_id INTEGER NOT NULL,
                neighborhood_id INTEGER NOT NULL,
                PRIMARY KEY (post_id, neighborhood_id),
                FOREIGN KEY (post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (neighborhood_id) REFERENCES neighborhoods(id) ON DELETE CASCADE
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id BIGSERIAL PRIMARY KEY,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                excerpt TEXT,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                cover_image_url TEXT,
                author_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                published_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blog_posts_status ON blog_posts(status);
            CREATE TABLE IF NOT EXISTS post_businesses (
                post_id BIGINT NOT NULL REFERENCES blog_posts(id) ON DELETE CASCADE,
                business_listing_id BIGINT NOT NULL REFERENCES business_listings(id) ON DELETE CASCADE,
                PRIMARY KEY (post_id, business_listing_id)
            );
            CREATE TABLE IF NOT EXISTS post_neighborhoods (
                post_id BIGINT NOT NULL REFERENCES blog_posts(id) ON DELETE CASCADE,
                neighborhood_id BIGINT NOT NULL REFERENCES neighborhoods(id) ON DELETE CASCADE,
                PRIMARY KEY (post_id, neighborhood_id)
            );
        "#,
    },
    Migration {
        version: 10,
        name: "create_media_items",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS media_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                media_type VARCHAR(20) NOT NULL,
                url TEXT NOT NULL,
                alt_text TEXT,
                neighborhood_id INTEGER,
                business_listing_id INTEGER,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (neighborhood_id) REFERENCES neighborhoods(id) ON DELETE SET NULL,
                FOREIGN KEY (business_listing_id) REFERENCES business_listings(id) ON DELETE CASCADE
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS media_items (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                media_type VARCHAR(20) NOT NULL,
                url TEXT NOT NULL,
                alt_text TEXT,
                neighborhood_id BIGINT REFERENCES neighborhoods(id) ON DELETE SET NULL,
                business_listing_id BIGINT REFERENCES business_listings(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL
            );
        "#,
    },
    Migration {
        version: 11,
        name: "create_newsletters",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS newsletters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                subject VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                scheduled_for TIMESTAMP,
                sent_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS newsletters (
                id BIGSERIAL PRIMARY KEY,
                slug VARCHAR(200) NOT NULL UNIQUE,
                title VARCHAR(255) NOT NULL,
                subject VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                content_html TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                scheduled_for TIMESTAMPTZ,
                sent_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
        "#,
    },
    Migration {
        version: 12,
        name: "create_submissions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS submissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                submission_type VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                payment_status VARCHAR(20) NOT NULL DEFAULT 'unpaid',
                contact_name VARCHAR(200) NOT NULL,
                email VARCHAR(255) NOT NULL,
                phone VARCHAR(50),
                title VARCHAR(255) NOT NULL,
                description TEXT,
                website TEXT,
                neighborhood_id INTEGER,
                event_starts_at TIMESTAMP,
                amount_cents INTEGER NOT NULL,
                checkout_reference VARCHAR(64) UNIQUE,
                review_note TEXT,
                created_record_id INTEGER,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (neighborhood_id) REFERENCES neighborhoods(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS submissions (
                id BIGSERIAL PRIMARY KEY,
                submission_type VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'pending',
                payment_status VARCHAR(20) NOT NULL DEFAULT 'unpaid',
                contact_name VARCHAR(200) NOT NULL,
                email VARCHAR(255) NOT NULL,
                phone VARCHAR(50),
                title VARCHAR(255) NOT NULL,
                description TEXT,
                website TEXT,
                neighborhood_id BIGINT REFERENCES neighborhoods(id) ON DELETE SET NULL,
                event_starts_at TIMESTAMPTZ,
                amount_cents BIGINT NOT NULL,
                checkout_reference VARCHAR(64) UNIQUE,
                review_note TEXT,
                created_record_id BIGINT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);
        "#,
    },
    Migration {
        version: 13,
        name: "create_subscriptions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                business_listing_id INTEGER NOT NULL,
                tier VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                external_reference VARCHAR(255),
                current_period_end TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (business_listing_id) REFERENCES business_listings(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_listing ON subscriptions(business_listing_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id BIGSERIAL PRIMARY KEY,
                business_listing_id BIGINT NOT NULL REFERENCES business_listings(id) ON DELETE CASCADE,
                tier VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                external_reference VARCHAR(255),
                current_period_end TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_subscriptions_listing ON subscriptions(business_listing_id);
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied: Vec<i32> = get_applied_migrations(pool)
        .await?
        .iter()
        .map(|m| m.version)
        .collect();

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL
            )
            "#
        }
        DatabaseDriver::Postgres => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// List migrations already applied to this database
pub async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    const SQL: &str = "SELECT version, name, applied_at FROM _migrations ORDER BY version";
    let records = match pool.backend() {
        Backend::Sqlite(p) => sqlx::query_as::<_, MigrationRecord>(SQL).fetch_all(p).await,
        Backend::Postgres(p) => sqlx::query_as::<_, MigrationRecord>(SQL).fetch_all(p).await,
    }
    .context("Failed to read applied migrations")?;
    Ok(records)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    const RECORD_SQL: &str = "INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)";

    match pool.backend() {
        Backend::Sqlite(p) => {
            let mut tx = p.begin().await?;
            for statement in split_sql_statements(migration.up_sqlite) {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query(RECORD_SQL)
                .bind(migration.version)
                .bind(migration.name)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
        Backend::Postgres(p) => {
            let mut tx = p.begin().await?;
            for statement in split_sql_statements(migration.up_postgres) {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
            }
            sqlx::query(&postgres_sql(RECORD_SQL))
                .bind(migration.version)
                .bind(migration.name)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }
    }

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !is_comment_only(s))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[test]
    fn test_migration_versions_are_ascending_and_unique() {
        let versions: Vec<i32> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INTEGER);\n-- comment only\n;\nCREATE INDEX i ON a(id);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INTEGER)", "CREATE INDEX i ON a(id)"]);
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());
        let applied = run_migrations(&pool).await.unwrap();
        assert_eq!(applied, MIGRATIONS.len());
        assert!(is_up_to_date(&pool).await.unwrap());

        let applied_again = run_migrations(&pool).await.unwrap();
        assert_eq!(applied_again, 0);

        let records = get_applied_migrations(&pool).await.unwrap();
        assert_eq!(records.len(), MIGRATIONS.len());
        assert_eq!(records[0].name, "create_users");
    }

    #[tokio::test]
    async fn test_settings_are_seeded() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let Backend::Sqlite(p) = pool.backend() else {
            panic!("expected sqlite test pool");
        };
        let value: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = 'site_name'")
            .fetch_one(p)
            .await
            .unwrap();
        assert_eq!(value, "Townsquare");
    }
}
