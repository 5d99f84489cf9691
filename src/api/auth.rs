use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use derive_new::new;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use snafu::{ensure, Location, OptionExt as _, Snafu};

/// Header carrying the pre-shared key of internal callers.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

#[derive(Debug, Snafu, Serialize)]
#[serde(tag = "error")]
#[snafu(visibility(pub))]
pub enum AuthError {
    #[snafu(display("request does not carry an api key"))]
    MissingKey {
        #[serde(skip)]
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("api key does not match"))]
    InvalidKey {
        #[serde(skip)]
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    message: String,
    #[serde(flatten)]
    data: AuthError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let content = AuthResponse {
            message: self.to_string(),
            data: self,
        };

        (StatusCode::UNAUTHORIZED, Json(content)).into_response()
    }
}

/// Server-held secret that internal callers must present in [API_KEY_HEADER].
#[derive(Debug, Clone, new)]
pub struct ApiKey {
    secret: SecretString,
}

impl ApiKey {
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let presented = headers.get(API_KEY_HEADER).context(MissingKeySnafu)?;
        let presented = presented.to_str().ok().context(InvalidKeySnafu)?;

        ensure!(presented == self.secret.expose_secret().as_str(), InvalidKeySnafu);

        Ok(())
    }
}
