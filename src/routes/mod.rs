use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod applications;
pub mod auth;
pub mod health;
pub mod messages;
pub mod orders;
pub mod packages;
pub mod plans;
pub mod revisions;
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

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
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
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let orders_routes = Router::new()
        .route("/", get(orders::list_orders).post(orders::create_order))
        .route("/:id", get(orders::get_order))
        .route("/:id/start", post(orders::start_order))
        .route("/:id/status", patch(orders::update_order_status))
        .route(
            "/:id/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        .route(
            "/:id/revisions",
            get(revisions::list_revisions).post(revisions::create_revision),
        )
        .route(
            "/:id/revisions/purchase",
            post(revisions::purchase_revisions),
        )
        .route("/:id/plans", get(plans::list_plans).post(plans::upload_plan));

    let plans_routes = Router::new().route("/:id/purge", post(plans::purge_plan));

    let users_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/:id/role", patch(users::update_user_role));

    // Catalog reads are public; the write handlers gate themselves through
    // the extractor, so the whole nest stays outside the auth layer.
    let packages_routes = Router::new()
        .route("/", get(packages::list_packages).post(packages::create_package))
        .route("/:id", patch(packages::update_package));

    // Invite links are capability URLs used by people without accounts, so
    // the token endpoints are public as well.
    let applications_routes = Router::new()
        .route("/", get(applications::list_applications))
        .route("/invite", post(applications::invite))
        .route("/token/:token", get(applications::get_by_token))
        .route("/token/:token/submit", post(applications::submit))
        .route("/:id/review", post(applications::review));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/orders", orders_routes)
        .nest("/api/plans", plans_routes)
        .nest("/api/users", users_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/packages", packages_routes)
        .nest("/api/applications", applications_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 2))
}
