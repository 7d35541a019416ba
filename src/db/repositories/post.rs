//! Blog post repository
//!
//! Posts own their `post_businesses` / `post_neighborhoods` link rows; the
//! link sets are always written as a whole, inside the same transaction as
//! the post row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{BlogPost, ListParams, PostStatus};

/// Replacement link sets for a post; `None` leaves a set untouched
#[derive(Debug, Clone, Default)]
pub struct PostLinks {
    pub business_ids: Option<Vec<i64>>,
    pub neighborhood_ids: Option<Vec<i64>>,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &BlogPost, links: &PostLinks) -> Result<BlogPost>;
    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>>;
    async fn list(&self, published_only: bool, params: &ListParams) -> Result<(Vec<BlogPost>, i64)>;
    async fn list_published_by_neighborhood(&self, neighborhood_id: i64) -> Result<Vec<BlogPost>>;
    async fn update(&self, post: &BlogPost, links: &PostLinks) -> Result<BlogPost>;
    async fn delete(&self, id: i64) -> Result<bool>;
    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
    async fn count_by_status(&self, status: PostStatus) -> Result<i64>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_POST: &str = "SELECT p.id, p.slug, p.title, p.excerpt, p.content, p.content_html, p.cover_image_url, \
     p.author_id, p.status, p.published_at, p.created_at, p.updated_at FROM blog_posts p";

const NEWEST_FIRST: &str = "COALESCE(p.published_at, p.created_at) DESC, p.id DESC";

const DELETE_BUSINESS_LINKS: &str = "DELETE FROM post_businesses WHERE post_id = ?";
const INSERT_BUSINESS_LINK: &str =
    "INSERT INTO post_businesses (post_id, business_listing_id) VALUES (?, ?) ON CONFLICT DO NOTHING";
const DELETE_NEIGHBORHOOD_LINKS: &str = "DELETE FROM post_neighborhoods WHERE post_id = ?";
const INSERT_NEIGHBORHOOD_LINK: &str =
    "INSERT INTO post_neighborhoods (post_id, neighborhood_id) VALUES (?, ?) ON CONFLICT DO NOTHING";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    slug: String,
    title: String,
    excerpt: Option<String>,
    content: String,
    content_html: String,
    cover_image_url: Option<String>,
    author_id: Option<i64>,
    status: String,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for BlogPost {
    type Error = anyhow::Error;

    fn try_from(row: PostRow) -> Result<Self> {
        Ok(BlogPost {
            id: row.id,
            slug: row.slug,
            title: row.title,
            excerpt: row.excerpt,
            content: row.content,
            content_html: row.content_html,
            cover_image_url: row.cover_image_url,
            author_id: row.author_id,
            status: row.status.parse()?,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_posts(rows: Vec<PostRow>) -> Result<Vec<BlogPost>> {
    rows.into_iter().map(BlogPost::try_from).collect()
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &BlogPost, links: &PostLinks) -> Result<BlogPost> {
        let now = Utc::now();
        let id = with_dialect!(self.pool, |pool, sql| {
            async {
                let mut tx = pool.begin().await?;
                let id = sqlx::query_scalar::<_, i64>(&sql(
                    "INSERT INTO blog_posts (slug, title, excerpt, content, content_html, cover_image_url, author_id, status, published_at, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                ))
                .bind(&post.slug)
                .bind(&post.title)
                .bind(&post.excerpt)
                .bind(&post.content)
                .bind(&post.content_html)
                .bind(&post.cover_image_url)
                .bind(post.author_id)
                .bind(post.status.to_string())
                .bind(post.published_at)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;

                for business_id in links.business_ids.iter().flatten() {
                    sqlx::query(&sql(INSERT_BUSINESS_LINK))
                        .bind(id)
                        .bind(*business_id)
                        .execute(&mut *tx)
                        .await?;
                }
                for neighborhood_id in links.neighborhood_ids.iter().flatten() {
                    sqlx::query(&sql(INSERT_NEIGHBORHOOD_LINK))
                        .bind(id)
                        .bind(*neighborhood_id)
                        .execute(&mut *tx)
                        .await?;
                }

                tx.commit().await?;
                Ok::<i64, sqlx::Error>(id)
            }
            .await
        })
        .context("Failed to create post")?;

        Ok(BlogPost {
            id,
            created_at: now,
            updated_at: now,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<BlogPost>> {
        let sql = format!("{} WHERE p.id = ?", SELECT_POST);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, PostRow>(sql).bind(id).fetch_optional(pool).await
        })
        .context("Failed to get post")?;
        row.map(BlogPost::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<BlogPost>> {
        let sql = format!("{} WHERE p.slug = ?", SELECT_POST);
        let row = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, PostRow>(sql).bind(slug).fetch_optional(pool).await
        })
        .context("Failed to get post by slug")?;
        row.map(BlogPost::try_from).transpose()
    }

    async fn list(&self, published_only: bool, params: &ListParams) -> Result<(Vec<BlogPost>, i64)> {
        let where_clause = if published_only {
            " WHERE p.status = 'published'"
        } else {
            ""
        };

        let count_sql = format!("SELECT COUNT(*) FROM blog_posts p{}", where_clause);
        let total = on_backend!(self.pool, &count_sql, |pool, sql| {
            sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await
        })
        .context("Failed to count posts")?;

        let list_sql = format!("{}{} ORDER BY {} LIMIT ? OFFSET ?", SELECT_POST, where_clause, NEWEST_FIRST);
        let rows = on_backend!(self.pool, &list_sql, |pool, sql| {
            sqlx::query_as::<_, PostRow>(sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
        })
        .context("Failed to list posts")?;

        Ok((into_posts(rows)?, total))
    }

    async fn list_published_by_neighborhood(&self, neighborhood_id: i64) -> Result<Vec<BlogPost>> {
        let sql = format!(
            "{} INNER JOIN post_neighborhoods pn ON pn.post_id = p.id \
             WHERE pn.neighborhood_id = ? AND p.status = 'published' ORDER BY {}",
            SELECT_POST, NEWEST_FIRST
        );
        let rows = on_backend!(self.pool, &sql, |pool, sql| {
            sqlx::query_as::<_, PostRow>(sql)
                .bind(neighborhood_id)
                .fetch_all(pool)
                .await
        })
        .context("Failed to list neighborhood posts")?;
        into_posts(rows)
    }

    async fn update(&self, post: &BlogPost, links: &PostLinks) -> Result<BlogPost> {
        let now = Utc::now();
        with_dialect!(self.pool, |pool, sql| {
            async {
                let mut tx = pool.begin().await?;
                sqlx::query(&sql(
                    "UPDATE blog_posts SET slug = ?, title = ?, excerpt = ?, content = ?, content_html = ?, cover_image_url = ?, \
                     author_id = ?, status = ?, published_at = ?, updated_at = ? WHERE id = ?",
                ))
                .bind(&post.slug)
                .bind(&post.title)
                .bind(&post.excerpt)
                .bind(&post.content)
                .bind(&post.content_html)
                .bind(&post.cover_image_url)
                .bind(post.author_id)
                .bind(post.status.to_string())
                .bind(post.published_at)
                .bind(now)
                .bind(post.id)
                .execute(&mut *tx)
                .await?;

                if let Some(business_ids) = &links.business_ids {
                    sqlx::query(&sql(DELETE_BUSINESS_LINKS))
                        .bind(post.id)
                        .execute(&mut *tx)
                        .await?;
                    for business_id in business_ids {
                        sqlx::query(&sql(INSERT_BUSINESS_LINK))
                            .bind(post.id)
                            .bind(*business_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                }
                if let Some(neighborhood_ids) = &links.neighborhood_ids {
                    sqlx::query(&sql(DELETE_NEIGHBORHOOD_LINKS))
                        .bind(post.id)
                        .execute(&mut *tx)
                        .await?;
                    for neighborhood_id in neighborhood_ids {
                        sqlx::query(&sql(INSERT_NEIGHBORHOOD_LINK))
                            .bind(post.id)
                            .bind(*neighborhood_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                }

                tx.commit().await
            }
            .await
        })
        .context("Failed to update post")?;

        self.get_by_id(post.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, "DELETE FROM blog_posts WHERE id = ?", |pool, sql| {
            sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete post")?;
        Ok(affected > 0)
    }

    async fn slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM blog_posts WHERE slug = ? AND id <> ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(slug)
                .bind(exclude_id.unwrap_or(0))
                .fetch_one(pool)
                .await
        )
        .context("Failed to check post slug")?;
        Ok(count > 0)
    }

    async fn count_by_status(&self, status: PostStatus) -> Result<i64> {
        let count = on_backend!(
            self.pool,
            "SELECT COUNT(*) FROM blog_posts WHERE status = ?",
            |pool, sql| sqlx::query_scalar::<_, i64>(sql)
                .bind(status.to_string())
                .fetch_one(pool)
                .await
        )
        .context("Failed to count posts")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::repositories::{ListingRepository, SqlxListingRepository};
    use crate::models::{BusinessListing, ListingStatus, ListingTier};

    fn post(slug: &str, status: PostStatus) -> BlogPost {
        let now = Utc::now();
        BlogPost {
            id: 0,
            slug: slug.to_string(),
            title: slug.to_uppercase(),
            excerpt: None,
            content: "# Hello".to_string(),
            content_html: "<h1>Hello</h1>\n".to_string(),
            cover_image_url: None,
            author_id: None,
            status,
            published_at: (status == PostStatus::Published).then(Utc::now),
            created_at: now,
            updated_at: now,
        }
    }

    async fn seed_listing(pool: &DynDatabasePool, slug: &str) -> BusinessListing {
        let now = Utc::now();
        SqlxListingRepository::new(pool.clone())
            .create(&BusinessListing {
                id: 0,
                neighborhood_id: None,
                slug: slug.to_string(),
                name: slug.to_string(),
                description: None,
                category: None,
                address: None,
                phone: None,
                website: None,
                email: None,
                tier: ListingTier::Free,
                status: ListingStatus::Published,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_with_links_and_replace() {
        let pool = migrated_pool().await;
        let first = seed_listing(&pool, "first").await;
        let second = seed_listing(&pool, "second").await;
        let listings = SqlxListingRepository::new(pool.clone());
        let repo = SqlxPostRepository::new(pool);

        let links = PostLinks {
            business_ids: Some(vec![first.id, first.id]),
            neighborhood_ids: None,
        };
        let created = repo.create(&post("coffee-crawl", PostStatus::Draft), &links).await.unwrap();
        let linked = listings.list_by_post(created.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, first.id);

        let replace = PostLinks {
            business_ids: Some(vec![second.id]),
            neighborhood_ids: None,
        };
        repo.update(&created, &replace).await.unwrap();
        let linked = listings.list_by_post(created.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, second.id);

        repo.update(&created, &PostLinks::default()).await.unwrap();
        assert_eq!(listings.list_by_post(created.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_published_only() {
        let repo = SqlxPostRepository::new(migrated_pool().await);
        repo.create(&post("live", PostStatus::Published), &PostLinks::default())
            .await
            .unwrap();
        repo.create(&post("wip", PostStatus::Draft), &PostLinks::default())
            .await
            .unwrap();

        let (published, total) = repo.list(true, &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(published[0].slug, "live");

        let (all, total) = repo.list(false, &ListParams::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);
        assert_eq!(repo.count_by_status(PostStatus::Draft).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_link_target_rolls_back() {
        let repo = SqlxPostRepository::new(migrated_pool().await);
        let links = PostLinks {
            business_ids: Some(vec![404]),
            neighborhood_ids: None,
        };
        assert!(repo.create(&post("broken", PostStatus::Draft), &links).await.is_err());
        assert!(repo.get_by_slug("broken").await.unwrap().is_none());
    }
}
