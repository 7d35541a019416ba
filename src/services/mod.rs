//! Services layer - Business logic
//!
//! Services own validation, slug allocation, markdown rendering and cache
//! invalidation. They sit between the HTTP handlers and the repositories.

pub mod error;
pub mod event;
pub mod geo;
pub mod listing;
pub mod markdown;
pub mod media;
pub mod newsletter;
pub mod password;
pub mod payment;
pub mod post;
pub mod settings;
pub mod slug;
pub mod submission;
pub mod subscription;
pub mod user;

pub use error::ContentError;
pub use event::EventService;
pub use geo::GeoService;
pub use listing::ListingService;
pub use markdown::MarkdownRenderer;
pub use media::MediaService;
pub use newsletter::NewsletterService;
pub use password::{hash_password, verify_password};
pub use payment::{CheckoutSession, PaymentError, PaymentService, Reconciliation, WebhookEvent};
pub use post::PostService;
pub use settings::{SettingsService, SettingsServiceError, SiteSettings};
pub use slug::generate_slug;
pub use submission::{SubmissionError, SubmissionService};
pub use subscription::SubscriptionService;
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::cache::ContentCache;
    use crate::config::CacheConfig;
    use crate::db::DynDatabasePool;
    use crate::models::{
        CreateAreaInput, CreateCityInput, CreateNeighborhoodInput, Neighborhood,
    };

    use super::GeoService;

    /// Create a city and area holding a single neighborhood called `name`
    pub async fn seed_neighborhood(pool: &DynDatabasePool, name: &str) -> Neighborhood {
        let geo = GeoService::new(pool.clone(), ContentCache::shared(&CacheConfig::default()));
        let city = geo
            .create_city(CreateCityInput {
                slug: None,
                name: format!("{} City", name),
                state: "WA".to_string(),
            })
            .await
            .unwrap();
        let area = geo
            .create_area(CreateAreaInput {
                city_id: city.id,
                slug: None,
                name: format!("{} Area", name),
                description: None,
            })
            .await
            .unwrap();
        geo.create_neighborhood(CreateNeighborhoodInput {
            area_id: area.id,
            slug: None,
            name: name.to_string(),
            description: None,
            hero_image_url: None,
        })
        .await
        .unwrap()
    }
}
