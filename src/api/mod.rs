mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;

pub fn create_router(db: Database) -> Router {
    let api = Router::new()
        // Tasks, scoped by owner
        .route("/users/{user_id}/tasks", get(handlers::list_tasks))
        .route("/users/{user_id}/tasks", post(handlers::create_task))
        .route("/users/{user_id}/tasks/today", get(handlers::todays_tasks))
        .route("/users/{user_id}/tasks/reorder", put(handlers::reorder_tasks))
        .route("/users/{user_id}/tasks/completed", delete(handlers::clear_completed))
        .route("/users/{user_id}/tasks/{id}", get(handlers::get_task))
        .route("/users/{user_id}/tasks/{id}", put(handlers::update_task))
        .route("/users/{user_id}/tasks/{id}", delete(handlers::delete_task))
        .route("/users/{user_id}/tasks/{id}/complete", put(handlers::toggle_complete))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(db)
}
