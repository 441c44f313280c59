pub mod access;
pub mod activity;
pub mod admin;
pub mod auth;
pub mod bookmarks;
pub mod chapters;
pub mod collections;
pub mod comments;
pub mod error;
pub mod export;
pub mod follows;
pub mod jobs;
pub mod messages;
pub mod pagination;
pub mod ratings;
pub mod read_history;
pub mod read_model;
pub mod repos;
pub mod stories;
pub mod tags;
pub mod users;
