//! Blog post service
//!
//! Posts are written in Markdown and rendered to HTML on every write.
//! A post may feature businesses and neighborhoods; the link sets are
//! replaced wholesale on create/update.

use chrono::Utc;
use std::sync::Arc;

use super::error::{optional, required, ContentError};
use super::geo::CACHE_PREFIX_GUIDE;
use super::markdown::MarkdownRenderer;
use super::slug::{claim_slug, slug_changes};
use crate::cache::SharedCache;
use crate::db::repositories::post::PostLinks;
use crate::db::repositories::{
    ListingRepository, NeighborhoodRepository, PostRepository, SqlxListingRepository,
    SqlxNeighborhoodRepository, SqlxPostRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    BlogPost, BusinessListing, CreatePostInput, ListParams, PagedResult, PostStatus,
    PostWithLinks, UpdatePostInput,
};

/// Cache key prefixes
const CACHE_PREFIX_POSTS: &str = "posts:";
const CACHE_KEY_POST_LIST: &str = "posts:list:";
const CACHE_KEY_POST_BY_SLUG: &str = "posts:slug:";

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    listings: Arc<dyn ListingRepository>,
    neighborhoods: Arc<dyn NeighborhoodRepository>,
    cache: SharedCache,
    markdown: MarkdownRenderer,
}

impl PostService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            repo: SqlxPostRepository::boxed(pool.clone()),
            listings: SqlxListingRepository::boxed(pool.clone()),
            neighborhoods: SqlxNeighborhoodRepository::boxed(pool),
            cache,
            markdown: MarkdownRenderer::new(),
        }
    }

    /// Published posts, newest first
    pub async fn list_public(&self, params: &ListParams) -> Result<PagedResult<BlogPost>, ContentError> {
        let cache_key = format!("{}{}:{}", CACHE_KEY_POST_LIST, params.page, params.per_page);
        if let Some(hit) = self
            .cache
            .get::<PagedResult<BlogPost>>(&cache_key)
            .await
            .ok()
            .flatten()
        {
            return Ok(hit);
        }

        let (items, total) = self.repo.list(true, params).await?;
        let page = PagedResult::new(items, total, params);
        let _ = self.cache.set(&cache_key, &page).await;
        Ok(page)
    }

    pub async fn list_all(&self, params: &ListParams) -> Result<PagedResult<BlogPost>, ContentError> {
        let (items, total) = self.repo.list(false, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// A published post with its published businesses and its neighborhoods
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<PostWithLinks, ContentError> {
        let cache_key = format!("{}{}", CACHE_KEY_POST_BY_SLUG, slug);
        if let Some(hit) = self.cache.get::<PostWithLinks>(&cache_key).await.ok().flatten() {
            return Ok(hit);
        }

        let post = self
            .repo
            .get_by_slug(slug)
            .await?
            .filter(|p| p.status == PostStatus::Published)
            .ok_or_else(|| ContentError::NotFound("Post".to_string()))?;
        let mut view = self.with_links(post).await?;
        view.businesses.retain(BusinessListing::is_published);

        let _ = self.cache.set(&cache_key, &view).await;
        Ok(view)
    }

    /// Any post with all of its links, for the admin portal
    pub async fn get(&self, id: i64) -> Result<PostWithLinks, ContentError> {
        let post = self.find(id).await?;
        self.with_links(post).await
    }

    pub async fn create(&self, input: CreatePostInput, author_id: Option<i64>) -> Result<BlogPost, ContentError> {
        let title = required("title", &input.title)?;
        let content = required("content", &input.content)?;
        let links = PostLinks {
            business_ids: Some(dedup(input.business_ids)),
            neighborhood_ids: Some(dedup(input.neighborhood_ids)),
        };
        self.ensure_links(&links).await?;
        let repo = &self.repo;
        let slug = claim_slug(input.slug.as_deref(), &title, |s| async move {
            repo.slug_exists(&s, None).await
        })
        .await?;

        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        let post = BlogPost {
            id: 0,
            slug,
            title,
            excerpt: optional(input.excerpt),
            content_html: self.markdown.render(&content),
            content,
            cover_image_url: optional(input.cover_image_url),
            author_id,
            status,
            published_at: (status == PostStatus::Published).then_some(now),
            created_at: now,
            updated_at: now,
        };
        let created = self.repo.create(&post, &links).await?;

        tracing::info!(post_id = created.id, slug = %created.slug, status = %created.status, "Post created");
        self.invalidate_cache().await;
        Ok(created)
    }

    pub async fn update(&self, id: i64, input: UpdatePostInput) -> Result<BlogPost, ContentError> {
        let mut post = self.find(id).await?;
        let links = PostLinks {
            business_ids: input.business_ids.map(dedup),
            neighborhood_ids: input.neighborhood_ids.map(dedup),
        };
        self.ensure_links(&links).await?;

        if let Some(title) = input.title {
            post.title = required("title", &title)?;
        }
        if let Some(excerpt) = input.excerpt {
            post.excerpt = optional(excerpt);
        }
        if let Some(content) = input.content {
            post.content = required("content", &content)?;
            post.content_html = self.markdown.render(&post.content);
        }
        if let Some(cover_image_url) = input.cover_image_url {
            post.cover_image_url = optional(cover_image_url);
        }
        if let Some(status) = input.status {
            post.status = status;
        }
        // published_at keeps the first publication time
        if post.status == PostStatus::Published && post.published_at.is_none() {
            post.published_at = Some(Utc::now());
        }
        if let Some(slug) = input.slug.filter(|s| slug_changes(s, &post.slug)) {
            let repo = &self.repo;
            post.slug = claim_slug(Some(&slug), &post.title, |s| async move {
                repo.slug_exists(&s, Some(id)).await
            })
            .await?;
        }

        let updated = self.repo.update(&post, &links).await?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContentError> {
        if !self.repo.delete(id).await? {
            return Err(ContentError::NotFound("Post".to_string()));
        }
        tracing::info!(post_id = id, "Post deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn count_by_status(&self, status: PostStatus) -> Result<i64, ContentError> {
        Ok(self.repo.count_by_status(status).await?)
    }

    async fn find(&self, id: i64) -> Result<BlogPost, ContentError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Post".to_string()))
    }

    async fn with_links(&self, post: BlogPost) -> Result<PostWithLinks, ContentError> {
        let (businesses, neighborhoods) = tokio::try_join!(
            self.listings.list_by_post(post.id),
            self.neighborhoods.list_by_post(post.id),
        )?;
        Ok(PostWithLinks {
            post,
            businesses,
            neighborhoods,
        })
    }

    async fn ensure_links(&self, links: &PostLinks) -> Result<(), ContentError> {
        for id in links.business_ids.iter().flatten() {
            if self.listings.get_by_id(*id).await?.is_none() {
                return Err(ContentError::InvalidReference(format!("listing {} does not exist", id)));
            }
        }
        for id in links.neighborhood_ids.iter().flatten() {
            if self.neighborhoods.get_by_id(*id).await?.is_none() {
                return Err(ContentError::InvalidReference(format!(
                    "neighborhood {} does not exist",
                    id
                )));
            }
        }
        Ok(())
    }

    async fn invalidate_cache(&self) {
        self.cache.delete_prefix(CACHE_PREFIX_POSTS).await;
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
    }
}

fn dedup(mut ids: Vec<i64>) -> Vec<i64> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::config::CacheConfig;
    use crate::models::{CreateListingInput, ListingStatus};
    use crate::db::repositories::test_support::migrated_pool;
    use crate::services::ListingService;

    fn setup(pool: DynDatabasePool) -> PostService {
        PostService::new(pool, ContentCache::shared(&CacheConfig::default()))
    }

    fn input(title: &str, status: PostStatus) -> CreatePostInput {
        CreatePostInput {
            title: title.to_string(),
            content: "# Hello\n\nSome **news**.".to_string(),
            status: Some(status),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_renders_markdown_and_stamps_publication() {
        let service = setup(migrated_pool().await);
        let draft = service.create(input("Draft Notes", PostStatus::Draft), None).await.unwrap();
        assert!(draft.content_html.contains("<strong>news</strong>"));
        assert!(draft.published_at.is_none());

        let live = service.create(input("Live Notes", PostStatus::Published), None).await.unwrap();
        assert!(live.published_at.is_some());
    }

    #[tokio::test]
    async fn test_published_at_is_stamped_once() {
        let service = setup(migrated_pool().await);
        let post = service.create(input("Once", PostStatus::Draft), None).await.unwrap();

        let published = service
            .update(
                post.id,
                UpdatePostInput {
                    status: Some(PostStatus::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let first = published.published_at.expect("published_at set");

        let edited = service
            .update(
                post.id,
                UpdatePostInput {
                    content: Some("Edited".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.published_at, Some(first));
        assert_eq!(edited.content_html, "<p>Edited</p>\n");
    }

    #[tokio::test]
    async fn test_public_view_links_only_published_businesses() {
        let pool = migrated_pool().await;
        let listings = ListingService::new(pool.clone(), ContentCache::shared(&CacheConfig::default()));
        let open = listings
            .create(CreateListingInput {
                name: "Open Shop".to_string(),
                status: Some(ListingStatus::Published),
                ..Default::default()
            })
            .await
            .unwrap();
        let draft = listings
            .create(CreateListingInput {
                name: "Draft Shop".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let service = setup(pool);
        let mut post_input = input("Shop Roundup", PostStatus::Published);
        post_input.business_ids = vec![open.id, draft.id, open.id];
        service.create(post_input, None).await.unwrap();

        let view = service.get_published_by_slug("shop-roundup").await.unwrap();
        assert_eq!(view.businesses.len(), 1);
        assert_eq!(view.businesses[0].id, open.id);

        let admin_view = service.get(view.post.id).await.unwrap();
        assert_eq!(admin_view.businesses.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_link_is_rejected() {
        let service = setup(migrated_pool().await);
        let mut post_input = input("Bad Link", PostStatus::Draft);
        post_input.neighborhood_ids = vec![404];
        assert!(matches!(
            service.create(post_input, None).await,
            Err(ContentError::InvalidReference(_))
        ));
    }

    #[tokio::test]
    async fn test_drafts_are_hidden_from_public_list() {
        let service = setup(migrated_pool().await);
        service.create(input("Visible", PostStatus::Published), None).await.unwrap();
        service.create(input("Hidden", PostStatus::Draft), None).await.unwrap();

        let page = service.list_public(&ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(service.list_all(&ListParams::default()).await.unwrap().total, 2);
        assert_eq!(service.count_by_status(PostStatus::Draft).await.unwrap(), 1);
    }
}
