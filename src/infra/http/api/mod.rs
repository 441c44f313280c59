pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

pub fn build_api_router(state: ApiState) -> Router {
    let auth_state = state.clone();
    let rate_state = state.clone();

    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route(
            "/user/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/story",
            get(handlers::list_stories).post(handlers::create_story),
        )
        .route("/story/user/{user_id}", get(handlers::list_user_stories))
        .route(
            "/story/{id}",
            get(handlers::get_story)
                .put(handlers::update_story)
                .delete(handlers::delete_story),
        )
        .route("/story/{id}/export", get(handlers::export_story))
        .route(
            "/chapter",
            get(handlers::list_chapters).post(handlers::create_chapter),
        )
        .route(
            "/chapter/{id}",
            get(handlers::get_chapter)
                .put(handlers::update_chapter)
                .delete(handlers::delete_chapter),
        )
        .route("/comment", post(handlers::create_comment))
        .route(
            "/comment/story/{story_id}",
            get(handlers::list_story_comments),
        )
        .route(
            "/comment/chapter/{chapter_id}",
            get(handlers::list_chapter_comments),
        )
        .route("/comment/{id}/thread", get(handlers::comment_thread))
        .route(
            "/comment/{id}",
            put(handlers::update_comment).delete(handlers::delete_comment),
        )
        .route("/rating", post(handlers::create_rating))
        .route(
            "/rating/story/{story_id}",
            get(handlers::list_story_ratings),
        )
        .route(
            "/rating/story/{story_id}/stats",
            get(handlers::rating_stats),
        )
        .route(
            "/rating/{id}",
            put(handlers::update_rating).delete(handlers::delete_rating),
        )
        .route("/follow/feed", get(handlers::activity_feed))
        .route(
            "/follow/{user_id}",
            post(handlers::follow_user).delete(handlers::unfollow_user),
        )
        .route(
            "/follow/{user_id}/followers",
            get(handlers::list_followers),
        )
        .route(
            "/follow/{user_id}/following",
            get(handlers::list_following),
        )
        .route("/follow/{user_id}/stats", get(handlers::follow_stats))
        .route("/follow/{user_id}/check", get(handlers::check_following))
        .route("/tag", get(handlers::list_tags).post(handlers::create_tag))
        .route("/tag/categories", get(handlers::list_tag_categories))
        .route(
            "/tag/{id}",
            put(handlers::update_tag).delete(handlers::delete_tag),
        )
        .route(
            "/tag/story/{story_id}",
            get(handlers::story_tags)
                .put(handlers::assign_story_tags)
                .delete(handlers::clear_story_tags),
        )
        .route(
            "/tag/story/{story_id}/{tag_id}",
            delete(handlers::remove_story_tag),
        )
        .route("/bookmark", get(handlers::list_bookmarks))
        .route(
            "/bookmark/{story_id}",
            post(handlers::create_bookmark).delete(handlers::delete_bookmark),
        )
        .route(
            "/bookmark/{story_id}/status",
            get(handlers::bookmark_status),
        )
        .route("/read-history", get(handlers::list_read_history))
        .route(
            "/read-history/{story_id}",
            get(handlers::story_read_history),
        )
        .route("/collection", post(handlers::create_collection))
        .route("/collection/mine", get(handlers::my_collections))
        .route("/collection/discover", get(handlers::discover_collections))
        .route(
            "/collection/{id}",
            get(handlers::get_collection)
                .put(handlers::update_collection)
                .delete(handlers::delete_collection),
        )
        .route(
            "/collection/{id}/stories/{story_id}",
            post(handlers::add_collection_story).delete(handlers::remove_collection_story),
        )
        .route(
            "/collection/{id}/collaborators/{user_id}",
            post(handlers::add_collaborator).delete(handlers::remove_collaborator),
        )
        .route("/message", post(handlers::send_message))
        .route("/message/conversations", get(handlers::list_conversations))
        .route("/message/unread-count", get(handlers::unread_count))
        .route("/message/with/{user_id}", get(handlers::message_history))
        .route("/message/with/{user_id}/read", put(handlers::mark_read))
        .route("/message/{id}", delete(handlers::delete_message))
        .route("/admin/users", get(handlers::admin_list_users))
        .route("/admin/stories", get(handlers::admin_list_stories))
        .route("/admin/chapters", get(handlers::admin_list_chapters))
        .route("/admin/comments", get(handlers::admin_list_comments))
        .route("/export/backup", get(handlers::export_backup))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::api_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_auth,
        ))
}
