//! API handlers organized by resource type.
//!
//! Handlers stay thin: extract, call one service method, shape the response.
//! `ServiceError` converts into [`ApiError`](super::error::ApiError) through `?`.

mod admin;
mod auth;
mod bookmarks;
mod chapters;
mod collections;
mod comments;
mod export;
mod follows;
mod messages;
mod ratings;
mod read_history;
mod stories;
mod tags;
mod users;

pub use admin::*;
pub use auth::*;
pub use bookmarks::*;
pub use chapters::*;
pub use collections::*;
pub use comments::*;
pub use export::*;
pub use follows::*;
pub use messages::*;
pub use ratings::*;
pub use read_history::*;
pub use stories::*;
pub use tags::*;
pub use users::*;
