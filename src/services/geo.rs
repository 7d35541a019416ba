//! Geography service
//!
//! Cities, areas and neighborhoods, plus the neighborhood guide: the page
//! bundle of a neighborhood with its published listings, upcoming events,
//! posts and media. Only the events bypass the guide cache.

use anyhow::anyhow;
use chrono::Utc;
use std::sync::Arc;

use super::error::{optional, required, ContentError};
use super::slug::{claim_slug, slug_changes};
use crate::cache::SharedCache;
use crate::db::repositories::{
    AreaRepository, CityRepository, EventRepository, ListingRepository, MediaRepository,
    NeighborhoodRepository, PostRepository, SqlxAreaRepository, SqlxCityRepository,
    SqlxEventRepository, SqlxListingRepository, SqlxMediaRepository, SqlxNeighborhoodRepository,
    SqlxPostRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{
    Area, AreaWithNeighborhoods, City, CityWithAreas, CreateAreaInput, CreateCityInput,
    CreateNeighborhoodInput, EventFilter, ListParams, Neighborhood, NeighborhoodGuide,
    UpdateAreaInput, UpdateCityInput, UpdateNeighborhoodInput,
};

/// Cache key prefixes
const CACHE_PREFIX_GEO: &str = "geo:";
const CACHE_KEY_CITIES: &str = "geo:cities";
const CACHE_KEY_CITY_BY_SLUG: &str = "geo:city:";
const CACHE_KEY_AREA_BY_SLUG: &str = "geo:area:";
const CACHE_KEY_NEIGHBORHOODS: &str = "geo:neighborhoods";
/// Neighborhood guides; every content service clears this namespace on writes
pub(crate) const CACHE_PREFIX_GUIDE: &str = "guide:";

/// Upcoming events shown on a guide
const GUIDE_EVENT_LIMIT: u32 = 20;

pub struct GeoService {
    cities: Arc<dyn CityRepository>,
    areas: Arc<dyn AreaRepository>,
    neighborhoods: Arc<dyn NeighborhoodRepository>,
    listings: Arc<dyn ListingRepository>,
    events: Arc<dyn EventRepository>,
    posts: Arc<dyn PostRepository>,
    media: Arc<dyn MediaRepository>,
    cache: SharedCache,
}

impl GeoService {
    pub fn new(pool: DynDatabasePool, cache: SharedCache) -> Self {
        Self {
            cities: SqlxCityRepository::boxed(pool.clone()),
            areas: SqlxAreaRepository::boxed(pool.clone()),
            neighborhoods: SqlxNeighborhoodRepository::boxed(pool.clone()),
            listings: SqlxListingRepository::boxed(pool.clone()),
            events: SqlxEventRepository::boxed(pool.clone()),
            posts: SqlxPostRepository::boxed(pool.clone()),
            media: SqlxMediaRepository::boxed(pool),
            cache,
        }
    }

    // ------------------------------------------------------------------
    // Cities
    // ------------------------------------------------------------------

    pub async fn list_cities(&self) -> Result<Vec<City>, ContentError> {
        if let Some(cities) = self.cache.get::<Vec<City>>(CACHE_KEY_CITIES).await.ok().flatten() {
            return Ok(cities);
        }
        let cities = self.cities.list().await?;
        let _ = self.cache.set(CACHE_KEY_CITIES, &cities).await;
        Ok(cities)
    }

    pub async fn get_city(&self, id: i64) -> Result<City, ContentError> {
        self.cities
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("City".to_string()))
    }

    /// Public city page: the city with its areas
    pub async fn city_with_areas(&self, slug: &str) -> Result<CityWithAreas, ContentError> {
        let cache_key = format!("{}{}", CACHE_KEY_CITY_BY_SLUG, slug);
        if let Some(hit) = self.cache.get::<CityWithAreas>(&cache_key).await.ok().flatten() {
            return Ok(hit);
        }

        let city = self
            .cities
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| ContentError::NotFound("City".to_string()))?;
        let areas = self.areas.list_by_city(city.id).await?;
        let page = CityWithAreas { city, areas };

        let _ = self.cache.set(&cache_key, &page).await;
        Ok(page)
    }

    pub async fn create_city(&self, input: CreateCityInput) -> Result<City, ContentError> {
        let name = required("name", &input.name)?;
        let state = required("state", &input.state)?;
        let repo = &self.cities;
        let slug = claim_slug(input.slug.as_deref(), &name, |s| async move {
            repo.slug_exists(&s, None).await
        })
        .await?;

        let now = Utc::now();
        let city = self
            .cities
            .create(&City {
                id: 0,
                slug,
                name,
                state,
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(city_id = city.id, slug = %city.slug, "City created");
        self.invalidate_cache().await;
        Ok(city)
    }

    pub async fn update_city(&self, id: i64, input: UpdateCityInput) -> Result<City, ContentError> {
        let mut city = self.get_city(id).await?;

        if let Some(name) = input.name {
            city.name = required("name", &name)?;
        }
        if let Some(state) = input.state {
            city.state = required("state", &state)?;
        }
        if let Some(slug) = input.slug.filter(|s| slug_changes(s, &city.slug)) {
            let repo = &self.cities;
            city.slug = claim_slug(Some(&slug), &city.name, |s| async move {
                repo.slug_exists(&s, Some(id)).await
            })
            .await?;
        }

        let updated = self.cities.update(&city).await?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    /// Deletes the city together with its areas and neighborhoods
    pub async fn delete_city(&self, id: i64) -> Result<(), ContentError> {
        if !self.cities.delete(id).await? {
            return Err(ContentError::NotFound("City".to_string()));
        }
        tracing::info!(city_id = id, "City deleted");
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn count_cities(&self) -> Result<i64, ContentError> {
        Ok(self.cities.count().await?)
    }

    // ------------------------------------------------------------------
    // Areas
    // ------------------------------------------------------------------

    pub async fn list_areas(&self) -> Result<Vec<Area>, ContentError> {
        Ok(self.areas.list().await?)
    }

    pub async fn get_area(&self, id: i64) -> Result<Area, ContentError> {
        self.areas
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Area".to_string()))
    }

    /// Public area page: the area, its city and its neighborhoods
    pub async fn area_with_neighborhoods(&self, slug: &str) -> Result<AreaWithNeighborhoods, ContentError> {
        let cache_key = format!("{}{}", CACHE_KEY_AREA_BY_SLUG, slug);
        if let Some(hit) = self.cache.get::<AreaWithNeighborhoods>(&cache_key).await.ok().flatten() {
            return Ok(hit);
        }

        let area = self
            .areas
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| ContentError::NotFound("Area".to_string()))?;
        let (city, neighborhoods) = tokio::try_join!(
            self.cities.get_by_id(area.city_id),
            self.neighborhoods.list_by_area(area.id),
        )?;
        let city = city.ok_or_else(|| anyhow!("Area {} references missing city {}", area.id, area.city_id))?;
        let page = AreaWithNeighborhoods {
            area,
            city,
            neighborhoods,
        };

        let _ = self.cache.set(&cache_key, &page).await;
        Ok(page)
    }

    pub async fn create_area(&self, input: CreateAreaInput) -> Result<Area, ContentError> {
        let name = required("name", &input.name)?;
        self.ensure_city(input.city_id).await?;
        let repo = &self.areas;
        let slug = claim_slug(input.slug.as_deref(), &name, |s| async move {
            repo.slug_exists(&s, None).await
        })
        .await?;

        let now = Utc::now();
        let area = self
            .areas
            .create(&Area {
                id: 0,
                city_id: input.city_id,
                slug,
                name,
                description: optional(input.description),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(area_id = area.id, slug = %area.slug, "Area created");
        self.invalidate_cache().await;
        Ok(area)
    }

    pub async fn update_area(&self, id: i64, input: UpdateAreaInput) -> Result<Area, ContentError> {
        let mut area = self.get_area(id).await?;

        if let Some(city_id) = input.city_id {
            self.ensure_city(city_id).await?;
            area.city_id = city_id;
        }
        if let Some(name) = input.name {
            area.name = required("name", &name)?;
        }
        if let Some(description) = input.description {
            area.description = optional(description);
        }
        if let Some(slug) = input.slug.filter(|s| slug_changes(s, &area.slug)) {
            let repo = &self.areas;
            area.slug = claim_slug(Some(&slug), &area.name, |s| async move {
                repo.slug_exists(&s, Some(id)).await
            })
            .await?;
        }

        let updated = self.areas.update(&area).await?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete_area(&self, id: i64) -> Result<(), ContentError> {
        if !self.areas.delete(id).await? {
            return Err(ContentError::NotFound("Area".to_string()));
        }
        self.invalidate_cache().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Neighborhoods
    // ------------------------------------------------------------------

    pub async fn list_neighborhoods(&self) -> Result<Vec<Neighborhood>, ContentError> {
        if let Some(hit) = self
            .cache
            .get::<Vec<Neighborhood>>(CACHE_KEY_NEIGHBORHOODS)
            .await
            .ok()
            .flatten()
        {
            return Ok(hit);
        }
        let neighborhoods = self.neighborhoods.list().await?;
        let _ = self.cache.set(CACHE_KEY_NEIGHBORHOODS, &neighborhoods).await;
        Ok(neighborhoods)
    }

    pub async fn get_neighborhood(&self, id: i64) -> Result<Neighborhood, ContentError> {
        self.neighborhoods
            .get_by_id(id)
            .await?
            .ok_or_else(|| ContentError::NotFound("Neighborhood".to_string()))
    }

    pub async fn find_neighborhood_by_slug(&self, slug: &str) -> Result<Option<Neighborhood>, ContentError> {
        Ok(self.neighborhoods.get_by_slug(slug).await?)
    }

    pub async fn create_neighborhood(&self, input: CreateNeighborhoodInput) -> Result<Neighborhood, ContentError> {
        let name = required("name", &input.name)?;
        self.ensure_area(input.area_id).await?;
        let repo = &self.neighborhoods;
        let slug = claim_slug(input.slug.as_deref(), &name, |s| async move {
            repo.slug_exists(&s, None).await
        })
        .await?;

        let now = Utc::now();
        let neighborhood = self
            .neighborhoods
            .create(&Neighborhood {
                id: 0,
                area_id: input.area_id,
                slug,
                name,
                description: optional(input.description),
                hero_image_url: optional(input.hero_image_url),
                created_at: now,
                updated_at: now,
            })
            .await?;

        tracing::info!(neighborhood_id = neighborhood.id, slug = %neighborhood.slug, "Neighborhood created");
        self.invalidate_cache().await;
        Ok(neighborhood)
    }

    pub async fn update_neighborhood(
        &self,
        id: i64,
        input: UpdateNeighborhoodInput,
    ) -> Result<Neighborhood, ContentError> {
        let mut neighborhood = self.get_neighborhood(id).await?;

        if let Some(area_id) = input.area_id {
            self.ensure_area(area_id).await?;
            neighborhood.area_id = area_id;
        }
        if let Some(name) = input.name {
            neighborhood.name = required("name", &name)?;
        }
        if let Some(description) = input.description {
            neighborhood.description = optional(description);
        }
        if let Some(hero_image_url) = input.hero_image_url {
            neighborhood.hero_image_url = optional(hero_image_url);
        }
        if let Some(slug) = input.slug.filter(|s| slug_changes(s, &neighborhood.slug)) {
            let repo = &self.neighborhoods;
            neighborhood.slug = claim_slug(Some(&slug), &neighborhood.name, |s| async move {
                repo.slug_exists(&s, Some(id)).await
            })
            .await?;
        }

        let updated = self.neighborhoods.update(&neighborhood).await?;
        self.invalidate_cache().await;
        Ok(updated)
    }

    pub async fn delete_neighborhood(&self, id: i64) -> Result<(), ContentError> {
        if !self.neighborhoods.delete(id).await? {
            return Err(ContentError::NotFound("Neighborhood".to_string()));
        }
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn count_neighborhoods(&self) -> Result<i64, ContentError> {
        Ok(self.neighborhoods.count().await?)
    }

    /// Neighborhood page bundle
    ///
    /// The bundle is cached without its events. Upcoming events are read on
    /// every call so an event drops off the page as soon as it starts.
    pub async fn neighborhood_guide(&self, slug: &str) -> Result<NeighborhoodGuide, ContentError> {
        let cache_key = format!("{}{}", CACHE_PREFIX_GUIDE, slug);
        let mut guide = match self.cache.get::<NeighborhoodGuide>(&cache_key).await.ok().flatten() {
            Some(guide) => guide,
            None => {
                let guide = self.load_guide(slug).await?;
                let _ = self.cache.set(&cache_key, &guide).await;
                guide
            }
        };

        let event_filter = EventFilter {
            neighborhood: Some(guide.neighborhood.slug.clone()),
            starts_after: Some(Utc::now()),
            published_only: true,
        };
        let (events, _) = self
            .events
            .list(&event_filter, &ListParams::new(1, GUIDE_EVENT_LIMIT))
            .await?;
        guide.events = events;
        Ok(guide)
    }

    /// Guide bundle with an empty event list, fetched concurrently
    async fn load_guide(&self, slug: &str) -> Result<NeighborhoodGuide, ContentError> {
        let neighborhood = self
            .neighborhoods
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| ContentError::NotFound("Neighborhood".to_string()))?;
        let area = self.areas.get_by_id(neighborhood.area_id).await?.ok_or_else(|| {
            anyhow!(
                "Neighborhood {} references missing area {}",
                neighborhood.id,
                neighborhood.area_id
            )
        })?;

        let (city, listings, posts, media) = tokio::try_join!(
            self.cities.get_by_id(area.city_id),
            self.listings.list_published_by_neighborhood(neighborhood.id),
            self.posts.list_published_by_neighborhood(neighborhood.id),
            self.media.list_by_neighborhood(neighborhood.id),
        )?;
        let city = city.ok_or_else(|| anyhow!("Area {} references missing city {}", area.id, area.city_id))?;

        Ok(NeighborhoodGuide {
            neighborhood,
            area,
            city,
            listings,
            events: Vec::new(),
            posts,
            media,
        })
    }

    async fn ensure_city(&self, id: i64) -> Result<(), ContentError> {
        match self.cities.get_by_id(id).await? {
            Some(_) => Ok(()),
            None => Err(ContentError::InvalidReference(format!("city {} does not exist", id))),
        }
    }

    async fn ensure_area(&self, id: i64) -> Result<(), ContentError> {
        match self.areas.get_by_id(id).await? {
            Some(_) => Ok(()),
            None => Err(ContentError::InvalidReference(format!("area {} does not exist", id))),
        }
    }

    async fn invalidate_cache(&self) {
        self.cache.delete_prefix(CACHE_PREFIX_GEO).await;
        self.cache.delete_prefix(CACHE_PREFIX_GUIDE).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::config::CacheConfig;
    use crate::db::repositories::test_support::migrated_pool;

    async fn setup() -> GeoService {
        let pool = migrated_pool().await;
        GeoService::new(pool, ContentCache::shared(&CacheConfig::default()))
    }

    async fn seed(service: &GeoService) -> (City, Area, Neighborhood) {
        let city = service
            .create_city(CreateCityInput {
                slug: None,
                name: "Portland".to_string(),
                state: "OR".to_string(),
            })
            .await
            .unwrap();
        let area = service
            .create_area(CreateAreaInput {
                city_id: city.id,
                slug: None,
                name: "North Portland".to_string(),
                description: Some("  ".to_string()),
            })
            .await
            .unwrap();
        let neighborhood = service
            .create_neighborhood(CreateNeighborhoodInput {
                area_id: area.id,
                slug: Some("St. Johns".to_string()),
                name: "St Johns".to_string(),
                description: None,
                hero_image_url: None,
            })
            .await
            .unwrap();
        (city, area, neighborhood)
    }

    #[tokio::test]
    async fn test_slugs_are_generated_and_normalized() {
        let service = setup().await;
        let (city, area, neighborhood) = seed(&service).await;
        assert_eq!(city.slug, "portland");
        assert_eq!(area.slug, "north-portland");
        assert_eq!(area.description, None);
        assert_eq!(neighborhood.slug, "st-johns");
    }

    #[tokio::test]
    async fn test_duplicate_explicit_slug_is_rejected() {
        let service = setup().await;
        seed(&service).await;
        let result = service
            .create_city(CreateCityInput {
                slug: Some("portland".to_string()),
                name: "Portland".to_string(),
                state: "ME".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ContentError::DuplicateSlug(_))));
    }

    #[tokio::test]
    async fn test_parent_must_exist() {
        let service = setup().await;
        let result = service
            .create_area(CreateAreaInput {
                city_id: 42,
                slug: None,
                name: "Nowhere".to_string(),
                description: None,
            })
            .await;
        assert!(matches!(result, Err(ContentError::InvalidReference(_))));

        let result = service
            .create_neighborhood(CreateNeighborhoodInput {
                area_id: 42,
                slug: None,
                name: "Nowhere".to_string(),
                description: None,
                hero_image_url: None,
            })
            .await;
        assert!(matches!(result, Err(ContentError::InvalidReference(_))));
    }

    #[tokio::test]
    async fn test_city_page_lists_areas() {
        let service = setup().await;
        let (city, area, _) = seed(&service).await;

        let page = service.city_with_areas("portland").await.unwrap();
        assert_eq!(page.city.id, city.id);
        assert_eq!(page.areas.len(), 1);
        assert_eq!(page.areas[0].id, area.id);

        let area_page = service.area_with_neighborhoods(&area.slug).await.unwrap();
        assert_eq!(area_page.city.id, city.id);
        assert_eq!(area_page.neighborhoods.len(), 1);

        assert!(matches!(
            service.city_with_areas("seattle").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_guide_is_cached_until_a_write() {
        let service = setup().await;
        let (_, _, neighborhood) = seed(&service).await;

        let guide = service.neighborhood_guide("st-johns").await.unwrap();
        assert_eq!(guide.neighborhood.id, neighborhood.id);
        assert_eq!(guide.city.name, "Portland");
        assert!(guide.listings.is_empty());
        assert!(guide.events.is_empty());

        service
            .update_neighborhood(
                neighborhood.id,
                UpdateNeighborhoodInput {
                    description: Some(Some("By the bridge".to_string())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let guide = service.neighborhood_guide("st-johns").await.unwrap();
        assert_eq!(guide.neighborhood.description.as_deref(), Some("By the bridge"));
    }

    #[tokio::test]
    async fn test_guide_events_are_read_past_the_cache() {
        use crate::models::{Event, EventStatus};
        use chrono::Duration;

        let service = setup().await;
        let (_, _, neighborhood) = seed(&service).await;
        let now = Utc::now();
        let event = |slug: &str, starts_at| Event {
            id: 0,
            neighborhood_id: Some(neighborhood.id),
            business_listing_id: None,
            slug: slug.to_string(),
            title: slug.replace('-', " "),
            description: None,
            venue: None,
            starts_at,
            ends_at: None,
            status: EventStatus::Published,
            created_at: now,
            updated_at: now,
        };

        let mut market = service
            .events
            .create(&event("night-market", now + Duration::hours(1)))
            .await
            .unwrap();
        let guide = service.neighborhood_guide("st-johns").await.unwrap();
        assert_eq!(guide.events.len(), 1);

        // Repository writes skip cache invalidation
        market.starts_at = now - Duration::minutes(5);
        service.events.update(&market).await.unwrap();
        service
            .events
            .create(&event("bridge-run", now + Duration::days(2)))
            .await
            .unwrap();

        let guide = service.neighborhood_guide("st-johns").await.unwrap();
        let slugs: Vec<&str> = guide.events.iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["bridge-run"]);
    }

    #[tokio::test]
    async fn test_update_slug_and_delete_cascade() {
        let service = setup().await;
        let (city, _, _) = seed(&service).await;

        let updated = service
            .update_city(
                city.id,
                UpdateCityInput {
                    slug: Some("PDX".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "pdx");

        service.delete_city(city.id).await.unwrap();
        assert_eq!(service.count_neighborhoods().await.unwrap(), 0);
        assert!(service.list_areas().await.unwrap().is_empty());
        assert!(matches!(service.delete_city(city.id).await, Err(ContentError::NotFound(_))));
    }
}
