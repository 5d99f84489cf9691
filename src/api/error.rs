use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use snafu::{Location, Snafu};

use super::AuthError;
use crate::store::StoreError;
use crate::Located;

#[derive(Debug, Snafu, Serialize)]
#[serde(tag = "error")]
#[snafu(visibility(pub))]
pub enum ApiError {
    #[snafu(context(false), display("{source}"))]
    Unauthorized {
        #[serde(skip)]
        source: AuthError,
    },

    #[snafu(display("could not record the page view"))]
    RecordView {
        #[serde(skip)]
        source: StoreError,
        #[serde(skip)]
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not compute the view metrics"))]
    ComputeMetrics {
        #[serde(skip)]
        source: StoreError,
        #[serde(skip)]
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Serialize)]
struct ApiResponse {
    message: String,
    #[serde(flatten)]
    data: ApiError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if let ApiError::Unauthorized { source } = self {
            tracing::debug!(error = %source, "rejected internal request");
            return source.into_response();
        }

        let message = self.to_string();

        if let ApiError::RecordView { source, .. } | ApiError::ComputeMetrics { source, .. } = &self {
            tracing::error!(error = %source, location = %source.location(), "{message}");
        }

        let content = ApiResponse {
            message,
            data: self,
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(content)).into_response()
    }
}
