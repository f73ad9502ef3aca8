use axum::{http::Method, middleware::from_fn_with_state, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod health;
pub mod middleware;
pub mod response;
pub mod state;
pub mod users;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static(response::TRACE_ID_HEADER),
        ]);

    Router::new()
        .merge(health::routes())
        .merge(users::routes())
        .merge(bookings::routes())
        .layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(from_fn_with_state(state.request_timeout, middleware::request_timeout))
        .layer(from_fn_with_state(state.metrics.clone(), middleware::track_http))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
