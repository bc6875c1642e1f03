use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod bills;
pub mod document_types;
pub mod health;
pub mod roles;
pub mod setup;
pub mod tags;
pub mod users;

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
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let bills_routes = Router::new()
        .route("/", get(bills::list_bills).post(bills::create_bill))
        .route("/options", get(bills::bill_options))
        .route(
            "/:id",
            get(bills::get_bill)
                .patch(bills::update_bill)
                .delete(bills::delete_bill),
        )
        .route("/files/:file_id/download", get(bills::download_file));

    let tags_routes = Router::new()
        .route("/", get(tags::list_tags).post(tags::create_tag))
        .route("/:id", delete(tags::delete_tag));

    let document_types_routes = Router::new()
        .route(
            "/",
            get(document_types::list_document_types).post(document_types::create_document_type),
        )
        .route(
            "/:id",
            delete(document_types::delete_document_type),
        );

    let users_routes = Router::new()
        .route("/", get(users::list_users))
        .route(
            "/:id",
            patch(users::update_user).delete(users::delete_user),
        )
        .route("/:id/role", put(users::change_role));

    let roles_routes = Router::new()
        .route("/", get(roles::list_roles).post(roles::create_role))
        .route(
            "/:id",
            patch(roles::update_role).delete(roles::delete_role),
        );

    let setup_routes = Router::new().route("/", get(setup::setup_status).post(setup::run_setup));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/bills", bills_routes)
        .nest("/api/tags", tags_routes)
        .nest("/api/document-types", document_types_routes)
        .nest("/api/users", users_routes)
        .nest("/api/roles", roles_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/setup", setup_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
