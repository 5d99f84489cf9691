use dotenvy::dotenv;
use snafu::ResultExt as _;

use viewtally::api::{self, App};
use viewtally::config::Config;
use viewtally::error::{ApplicationError, BindAddressSnafu, OpenStoreSnafu, WebServerSnafu};
use viewtally::logger;

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = Config::from_env()?;

    let _guard = logger::init(&config)?;

    let store = config.store().await?;
    let history = store.load().await.context(OpenStoreSnafu)?;
    tracing::info!(store = %store.path().display(), days = history.len(), "opened view history");

    let app = App::new(store, config.api_key());
    let router = api::create_router(app, &config.public_dir);

    let listener = tokio::net::TcpListener::bind(config.host)
        .await
        .context(BindAddressSnafu {
            address: config.host,
        })?;
    tracing::info!(address = %config.host, "listening");

    axum::serve(listener, router).await.context(WebServerSnafu)
}
