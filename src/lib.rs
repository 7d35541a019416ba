//! Townsquare - backend for a local-media site
//!
//! Serves neighborhood guides, business listings, events, blog posts, media
//! and newsletters, takes paid business/event submissions and runs the
//! admin portal that reviews them.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
