use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/auth", auth_routes(app_state.clone()))
        .nest("/api/courses", course_routes(app_state.clone()))
        .nest("/api/orders", order_routes(app_state.clone()))
        .nest("/api/payment", payment_routes(app_state.clone()))
        .nest("/api/quiz", quiz_routes(app_state.clone()))
        .nest("/api/certificates", certificate_routes(app_state.clone()))
        .nest("/api/video", video_routes(app_state.clone()))
        .fallback(handlers::not_found)
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::login_rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .merge(login_route);

    let admin_routes = Router::new()
        .route("/admin/users", get(handlers::auth::list_users))
        .route(
            "/admin/users/{userId}/status",
            put(handlers::auth::update_user_status),
        )
        .route("/admin/cleanup", delete(handlers::auth::cleanup_test_users))
        .route("/admin/analytics", get(handlers::auth::analytics))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ));

    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .route("/update-profile", put(handlers::auth::update_profile))
        .route("/user/{userId}", get(handlers::auth::get_user))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn course_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::courses::list_courses).merge(
                post(handlers::courses::create_course)
                    .route_layer(middleware::from_fn(
                        middlewares::auth::admin_guard_middleware,
                    ))
                    .route_layer(middleware::from_fn_with_state(
                        app_state,
                        middlewares::auth::auth_middleware,
                    )),
            ),
        )
        .route("/{courseId}", get(handlers::courses::get_course))
}

fn order_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_guard = || middleware::from_fn(middlewares::auth::admin_guard_middleware);

    Router::new()
        .route(
            "/",
            post(handlers::orders::create_order)
                .merge(get(handlers::orders::list_orders).route_layer(admin_guard())),
        )
        .route(
            "/complete",
            post(handlers::orders::complete_order).route_layer(admin_guard()),
        )
        .route("/user/{userId}", get(handlers::orders::user_orders))
        .route(
            "/user/{userId}/courses",
            get(handlers::orders::purchased_courses),
        )
        .route(
            "/user/{userId}/course/{courseId}",
            get(handlers::orders::has_purchased),
        )
        .route("/{orderId}", get(handlers::orders::get_order))
        .route("/{orderId}/failed", post(handlers::orders::mark_failed))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn payment_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/create-order", post(handlers::payment::create_order))
        .route("/verify", post(handlers::payment::verify))
        .route("/status/{paymentId}", get(handlers::payment::payment_status))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn quiz_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_routes = Router::new()
        .route("/create", post(handlers::quiz::create_quiz))
        .route("/all", get(handlers::quiz::list_quizzes))
        .route(
            "/{quizId}",
            get(handlers::quiz::get_quiz)
                .put(handlers::quiz::update_quiz)
                .delete(handlers::quiz::delete_quiz),
        )
        .route("/{quizId}/publish", patch(handlers::quiz::publish_quiz))
        .route("/{quizId}/results", get(handlers::quiz::quiz_results))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ));

    Router::new()
        .route("/course/{courseId}", get(handlers::quiz::course_quizzes))
        .route("/{quizId}/start", get(handlers::quiz::start_attempt))
        .route("/{quizId}/submit", post(handlers::quiz::submit_attempt))
        .route("/attempts/{courseId}", get(handlers::quiz::my_attempts))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn certificate_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_routes = Router::new()
        .route("/admin/all", get(handlers::certificates::list_all))
        .route_layer(middleware::from_fn(
            middlewares::auth::admin_guard_middleware,
        ));

    let protected_routes = Router::new()
        .route("/issue", post(handlers::certificates::issue))
        .route(
            "/my-certificates",
            get(handlers::certificates::my_certificates),
        )
        .route(
            "/course/{courseId}",
            get(handlers::certificates::course_certificate),
        )
        .route(
            "/{certificateId}",
            get(handlers::certificates::get_certificate),
        )
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    Router::new()
        .route(
            "/verify/{certificateNumber}",
            get(handlers::certificates::verify),
        )
        .merge(protected_routes)
}

fn video_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/course/{courseId}", get(handlers::video::course_content))
        .route("/progress", post(handlers::video::record_progress))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
