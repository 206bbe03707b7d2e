use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod collab;
pub mod health;
pub mod projects;
pub mod scripts;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let projects_routes = Router::new()
        .route(
            "/",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/:id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/:id/timeline", get(projects::get_timeline))
        .route("/:id/members", post(projects::add_member))
        .route(
            "/:id/members/:user_id",
            delete(projects::remove_member),
        );

    let scripts_routes = Router::new()
        .route("/", get(scripts::list_scripts))
        .route("/scan", post(scripts::scan_script))
        .route(
            "/:id",
            get(scripts::get_script).delete(scripts::delete_script),
        )
        .route("/:id/version", patch(scripts::rename_version))
        .route("/:id/export", get(scripts::export_script));

    let risks_routes = Router::new()
        .route("/:id", patch(scripts::update_risk))
        .route(
            "/:id/comments",
            get(collab::list_comments).post(collab::add_comment),
        );

    let notifications_routes = Router::new()
        .route("/", get(collab::list_notifications))
        .route("/unread-count", get(collab::unread_count))
        .route("/read-all", post(collab::mark_all_read));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/projects", projects_routes)
        .nest("/api/scripts", scripts_routes)
        .nest("/api/risks", risks_routes)
        .nest("/api/notifications", notifications_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
