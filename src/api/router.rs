//! Router assembly.
//!
//! Middleware stack (outermost → innermost):
//! Extension → Trace → In-flight limit → Metrics → Auth (protected routes only) → Handler

use axum::Router;
use axum::routing::{delete, get, patch};
use tower_http::trace::TraceLayer;

use crate::api::endpoints::{appointments, doctors, health, patients, treatments};
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the API router. Handlers read `State<ApiContext>`; middleware reads
/// the same context from an `Extension`.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn build_router(ctx: ApiContext) -> Router {
    let protected = Router::new()
        .route("/doctors", get(doctors::list).post(doctors::create))
        .route(
            "/doctors/:id",
            get(doctors::detail).put(doctors::update).delete(doctors::remove),
        )
        .route("/doctors/:id/availability", get(doctors::availability))
        .route("/patients", get(patients::list).post(patients::create))
        .route(
            "/patients/:id",
            get(patients::detail).put(patients::update).delete(patients::remove),
        )
        .route(
            "/patients/:id/treatments",
            get(treatments::list).post(treatments::create),
        )
        .route("/treatments/:id", delete(treatments::remove))
        .route(
            "/appointments",
            get(appointments::list).post(appointments::create),
        )
        .route(
            "/appointments/:id",
            get(appointments::detail)
                .put(appointments::update)
                .delete(appointments::remove),
        )
        .route("/appointments/:id/status", patch(appointments::set_status))
        .with_state(ctx.clone())
        // route_layer: unmatched paths stay 404 instead of 401
        .route_layer(axum::middleware::from_fn(middleware::require_auth));

    let public = Router::new()
        .route("/health", get(health::check))
        .with_state(ctx.clone());

    Router::new()
        .nest("/api", public.merge(protected))
        .layer(axum::middleware::from_fn(middleware::record_metrics))
        .layer(axum::middleware::from_fn(middleware::limit_in_flight))
        .layer(TraceLayer::new_for_http())
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx))
}
