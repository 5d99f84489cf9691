use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

use super::App;
use crate::Located;

/// Leading path segments that never count as a page render.
const EXCLUDED_PREFIXES: &[&str] = &[
    "api",
    "assets",
    "static",
    "favicon.ico",
    "sitemap.xml",
    "robots.txt",
];

pub fn is_page(method: &Method, path: &str) -> bool {
    let path = path.trim_start_matches('/');

    method == Method::GET
        && !EXCLUDED_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix))
}

/// Records a view for every successfully rendered page without delaying the response.
pub async fn record_page_views(State(app): State<App>, request: Request, next: Next) -> Response {
    let counted = is_page(request.method(), request.uri().path());
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;

    if counted && response.status().is_success() {
        let store = app.store.clone();

        tokio::spawn(async move {
            if let Err(error) = store.record_view().await {
                tracing::warn!(%path, %error, location = %error.location(), "could not record page view");
            }
        });
    }

    response
}
