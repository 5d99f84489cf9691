use std::path::Path;

use axum::routing::{get, post};
use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

mod auth;
mod error;
mod page_view;
mod state;

pub use auth::*;
pub use error::*;
pub use page_view::{is_page, record_page_views};
pub use state::*;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Internal endpoints under `/api`, pages from `public_dir` for everything else.
pub fn create_router(app: App, public_dir: impl AsRef<Path>) -> Router {
    let api = Router::new()
        .route("/internal/registerPageView", post(views::register))
        .route("/metrics", get(views::metrics));

    Router::new()
        .nest("/api", api)
        .fallback_service(ServeDir::new(public_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(app.clone(), record_page_views)),
        )
        .with_state(app)
}

pub mod views {
    use axum::extract::State;
    use axum::http::{header, HeaderMap};
    use axum::response::IntoResponse;
    use axum::Json;
    use snafu::ResultExt as _;
    use tracing::instrument;

    use super::{App, ComputeMetricsSnafu, RecordViewSnafu, Result};

    #[instrument(skip_all)]
    pub async fn register(State(app): State<App>, headers: HeaderMap) -> Result<&'static str> {
        app.api_key.verify(&headers)?;

        let views = app.store.record_view().await.context(RecordViewSnafu)?;
        tracing::debug!(views, "registered page view");

        Ok("OK")
    }

    #[instrument(skip_all)]
    pub async fn metrics(State(app): State<App>) -> Result<impl IntoResponse> {
        let metrics = app.store.compute_metrics().await.context(ComputeMetricsSnafu)?;

        Ok(([(header::CACHE_CONTROL, "no-store")], Json(metrics)))
    }
}
