//! Data models
//!
//! Domain entities of the site (geography, listings, events, posts, media,
//! newsletters, submissions, subscriptions, users) plus the create/update
//! inputs accepted by the admin API.
//!
//! Update inputs use `Option<Option<T>>` for nullable columns: a missing
//! field leaves the column alone, an explicit `null` clears it.

mod event;
mod geo;
mod listing;
mod media;
mod newsletter;
mod pagination;
mod post;
mod session;
mod submission;
mod subscription;
mod user;

pub use event::{CreateEventInput, Event, EventFilter, EventStatus, UpdateEventInput};
pub use geo::{
    Area, AreaWithNeighborhoods, City, CityWithAreas, CreateAreaInput, CreateCityInput,
    CreateNeighborhoodInput, Neighborhood, NeighborhoodGuide, UpdateAreaInput, UpdateCityInput,
    UpdateNeighborhoodInput,
};
pub use listing::{
    BusinessListing, CreateListingInput, ListingFilter, ListingStatus, ListingTier,
    UpdateListingInput,
};
pub use media::{CreateMediaInput, MediaFilter, MediaItem, MediaType, UpdateMediaInput};
pub use newsletter::{CreateNewsletterInput, Newsletter, NewsletterStatus, UpdateNewsletterInput};
pub use pagination::{ListParams, PagedResult};
pub use post::{BlogPost, CreatePostInput, PostStatus, PostWithLinks, UpdatePostInput};
pub use session::Session;
pub use submission::{
    NewSubmission, PaymentStatus, ReviewInput, Submission, SubmissionForm, SubmissionStatus,
    SubmissionType,
};
pub use subscription::{
    CreateSubscriptionInput, Subscription, SubscriptionStatus, UpdateSubscriptionInput,
};
pub use user::{CreateUserInput, User, UserInfo, UserRole};

use serde::{Deserialize, Deserializer};

/// Deserialize a present field (including `null`) as `Some(..)`.
///
/// Combine with `#[serde(default)]` so an absent field stays `None`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
