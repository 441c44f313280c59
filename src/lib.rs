//! Story publishing backend: stories, chapters, comments, ratings, follows
//! and activity feeds behind a cached read model.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
