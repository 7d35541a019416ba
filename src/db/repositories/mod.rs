//! Database repositories
//!
//! One repository per entity. Each exposes a trait used by the services and
//! an sqlx implementation that runs on SQLite or Postgres. Rows are decoded
//! into `#[derive(sqlx::FromRow)]` records and converted into the domain
//! models from `crate::models`.

/// Run one sqlx expression against whichever backend the pool wraps.
///
/// Inside the body, `$pool` is the concrete pool and `$sql` the query text,
/// with `?` placeholders rewritten to `$n` on Postgres.
macro_rules! on_backend {
    ($db:expr, $query:expr, |$pool:ident, $sql:ident| $body:expr) => {{
        let query: &str = $query;
        match $db.backend() {
            $crate::db::Backend::Sqlite($pool) => {
                let $sql: &str = query;
                $body
            }
            $crate::db::Backend::Postgres($pool) => {
                let rewritten = $crate::db::postgres_sql(query);
                let $sql: &str = rewritten.as_str();
                $body
            }
        }
    }};
}

/// Like `on_backend!` for multi-statement work (transactions): `$sql` is a
/// function translating each statement for the active backend.
macro_rules! with_dialect {
    ($db:expr, |$pool:ident, $sql:ident| $body:expr) => {{
        match $db.backend() {
            $crate::db::Backend::Sqlite($pool) => {
                let $sql = |text: &str| -> String { text.to_string() };
                $body
            }
            $crate::db::Backend::Postgres($pool) => {
                let $sql = |text: &str| -> String { $crate::db::postgres_sql(text) };
                $body
            }
        }
    }};
}

pub mod area;
pub mod city;
pub mod event;
pub mod listing;
pub mod media;
pub mod neighborhood;
pub mod newsletter;
pub mod post;
pub mod session;
pub mod settings;
pub mod submission;
pub mod subscription;
pub mod user;

pub use area::{AreaRepository, SqlxAreaRepository};
pub use city::{CityRepository, SqlxCityRepository};
pub use event::{EventRepository, SqlxEventRepository};
pub use listing::{ListingRepository, SqlxListingRepository};
pub use media::{MediaRepository, SqlxMediaRepository};
pub use neighborhood::{NeighborhoodRepository, SqlxNeighborhoodRepository};
pub use newsletter::{NewsletterRepository, SqlxNewsletterRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{Setting, SettingsRepository, SqlxSettingsRepository};
pub use submission::{SqlxSubmissionRepository, SubmissionRepository};
pub use subscription::{SqlxSubscriptionRepository, SubscriptionRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Bind value for queries whose WHERE clause is assembled at runtime
#[derive(Debug, Clone)]
pub(crate) enum FilterValue {
    Text(String),
    Time(chrono::DateTime<chrono::Utc>),
}

/// `%needle%` pattern for a case-insensitive `LOWER(col) LIKE ?` search
pub(crate) fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
