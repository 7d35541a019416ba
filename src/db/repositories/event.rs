//! Event repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::FilterValue;
use crate::db::DynDatabasePool;
use crate::models::{Event, EventFilter, EventStatus, ListParams};

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn create(&self, event: &Event) -> Result<Event>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Event>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Event>>;
    /// Filtered page ordered by start time, plus the total match count
    async fn list(&self, filter: &EventFilter, params: &ListParams) -> Result<(Vec<Event>, i64)>;
    async fn update(&self, event: &Event) -> Result<Event>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn count_upcoming(&self, now: DateTime<Utc>) -> Result<i64>;
}

pub struct SqlxEventRepository {
    pool: DynDatabasePool,
}

impl SqlxEventRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EventRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_EVENT: &str = "SELECT e.id, e.neighborhood_id, e.business_listing_id, e.slug, e.title, e.description, \
     e.venue, e.starts_at, e.ends_at, e.status, e.created_at, e.updated_at FROM events e";

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    neighborhood_id: Option<i64>,
    business_listing_id: Option<i64>,
    slug: String,
    title: String,
    description: Option<String>,
    venue: Option<String>,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Event {
            id: row.id,
            neighborhood_id: row.neighborhood_id,
            business_listing_id: row.business_listing_id,
            slug: row.slug,
            title: row.title,
            description: row.description,
            venue: row.venue,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn filter_clause(filter: &EventFilter) -> (String, Vec<FilterValue>) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut binds = Vec::new();

    if filter.published_only {
        clauses.push("e.status = ?");
        binds.push(FilterValue::Text(EventStatus::Published.to_string()));
    }
    if let Some(slug) = filter.neighborhood.as_deref().filter(|s| !s.is_empty()) {
        clauses.push("e.neighborhood_id IN (SELECT id FROM neighborhoods WHERE slug = ?)");
        binds.push(FilterValue::Text(slug.to_string()));
    }
    if let Some(after) = filter.starts_after {
        clauses.push("e.starts_at >= ?");
        binds.push(FilterValue::Time(after));
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), binds)
    }
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn create(&self, event: &Event) -> Result<Event> {
        let now = Utc::now();
        let id = on_backend!(
            self.pool,
            "INSERT INTO events (neighborhood_id, business_listing_id, slug, title, description, venue, starts_at, ends_at, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(event.neighborhood_id)
                .bind(event.business_listing_id)
                .bind(&event.slug)
                .bind(&event.title)
                .bind(&event.description)
                .bind(&event.venue)
                .bind(event.starts_at)
                .bind(event.ends_at)
                .bind(event.status.to_string())
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
        )
        .context("Failed to create event")?;

        Ok(Event {
            id,
            created_at: now,
            updated_at: now,
            ..event.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Event>> {
        let sql = format!("{} WHERE e.id = ?", SELECT_EVENT);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, EventRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get event")?;
        row.map(Event::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Event>> {
        let sql = format!("{} WHERE e.slug = ?", SELECT_EVENT);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, EventRow>(sql).bind(slug).fetch_optional(pool).await
        })
        .context("Failed to get event by slug")?;
        row.map(Event::try_from).transpose()
    }

    async fn list(&self, filter: &EventFilter, params: &ListParams) -> Result<(Vec<Event>, i64)> {
        let (where_clause, binds) = filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM events e{}", where_clause);
        let total = on_backend!(self.pool, &count_sql, |pool, sql| {
            let mut query = sqlx::query_scalar::<_, i64>(sql);
            for value in &binds {
                query = match value {
                    FilterValue::Text(v) => query.bind(v.clone()),
                    FilterValue::Time(v) => query.bind(*v),
                };
            }
            query.fetch_one(pool).await
        })
        .context("Failed to count events")?;

        let list_sql = format!(
            "{}{} ORDER BY e.starts_at ASC, e.id ASC LIMIT ? OFFSET ?",
            SELECT_EVENT, where_clause
        );
        let rows = on_backend!(self.pool, &list_sql, |pool, sql| {
            let mut query = sqlx::query_as::<_, EventRow>(sql);
            for value in &binds {
                query = match value {
                    FilterValue::Text(v) => query.bind(v.clone()),
                    FilterValue::Time(v) => query.bind(*v),
                };
            }
            query
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
        })
        .context("Failed to list events")?;

        let events = rows.into_iter().map(Event::try_from).collect::<Result<Vec<_>>>()?;
        Ok((events, total))
    }

    async fn update(&self, event: &Event) -> Result<Event> {
        let now = Utc::now();
        on_backend!(
            self.pool,
            "UPDATE events SET neighborhood_id = ?, business_listing_id = ?, slug = ?, title = ?, description = ?, venue = ?, \
             starts_at = ?, ends_at = ?, status = ?, updated_at = ? WHERE id = ?",
            |pool, sql| sqlx::query(sql)
                .bind(event.neighborhood_id)
                .bind(event.business_listing_id)
                .bind(&event.slug)
                .bind(&event.title)
                .bind(&event.description)
                .bind(&event.venue)
                .bind(event.starts_at)
                .bind(event.ends_at)
                .bind(event.status.to_string())
                .bind(now)
                .bind(event.id)
                .execute(pool)
                .await
                .map(|_| ())
        )
        .context("Failed to update event")?;

        self.get_by_id(event.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Event not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM events WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete event")?;
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM events WHERE slug = ? AND id <> ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(pool)
                .await
        )
        .context("Failed to check event slug")?;
        Ok(count > 0)
    }

    async fn count_upcoming(&self, now: DateTime<Utc>) -> Result<i64> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM events WHERE status = 'published' AND starts_at >= ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql).bind(now).fetch_one(pool).await
        )
        .context("Failed to count upcoming events")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use chrono::Duration;

    fn event(slug: &str, starts_at: DateTime<Utc>, status: EventStatus) -> Event {
        let now = Utc::now();
        Event {
            id: 0,
            neighborhood_id: None,
            business_listing_id: None,
            slug: slug.to_string(),
            title: slug.replace('-', " "),
            description: None,
            venue: Some("Dolores Park".to_string()),
            starts_at,
            ends_at: None,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upcoming_published_events_ascending() {
        let repo = SqlxEventRepository::new(migrated_pool().await);
        let now = Utc::now();

        repo.create(&event("last-week", now - Duration::days(7), EventStatus::Published))
            .await
            .unwrap();
        repo.create(&event("next-month", now + Duration::days(30), EventStatus::Published))
            .await
            .unwrap();
        repo.create(&event("tomorrow", now + Duration::days(1), EventStatus::Published))
            .await
            .unwrap();
        repo.create(&event("draft-party", now + Duration::days(2), EventStatus::Draft))
            .await
            .unwrap();

        let filter = EventFilter {
            starts_after: Some(now),
            published_only: true,
            ..Default::default()
        };
        let (events, total) = repo.list(&filter, &ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 2);
        let slugs: Vec<&str> = events.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["tomorrow", "next-month"]);
        assert_eq!(repo.count_upcoming(now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_sets_end_time() {
        let repo = SqlxEventRepository::new(migrated_pool().await);
        let start = Utc::now() + Duration::days(3);
        let mut created = repo
            .create(&event("street-fair", start, EventStatus::Draft))
            .await
            .unwrap();

        created.ends_at = Some(start + Duration::hours(4));
        created.status = EventStatus::Cancelled;
        let updated = repo.update(&created).await.unwrap();
        assert_eq!(updated.status, EventStatus::Cancelled);
        assert!(updated.ends_at.is_some());
        assert!(repo.slug_exists("street-fair", None).await.unwrap());
        assert!(repo.delete(created.id).await.unwrap());
    }
}
