use std::{env, sync::Arc};

use anyhow::{Context, Result};
use aulario::feed::{FeedCache, HttpFeedSource};
use aulario::server;
use reqwest::Client;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

/// Published CSV export of the classroom assignment sheet. The sheet
/// must be shared as "anyone with the link" in viewer mode, or the
/// publisher answers with a login page instead of data.
static DEFAULT_FEED_URL: &str =
    "https://docs.google.com/spreadsheets/d/1vkHJBV4c46_JWM2uiEdeiltHH9RN0VLhaSGPU6udYP4/export?format=csv&gid=0";

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(log_level.parse().unwrap_or(Level::INFO.into())),
        )
        .init();

    let feed_url = env::var("FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());
    let feed_url = Url::parse(&feed_url).context("parsing FEED_URL")?;
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    info!(feed = %feed_url, "starting classroom resolver service");

    let source = HttpFeedSource::new(Client::new(), feed_url);
    let cache = Arc::new(FeedCache::new(source));
    let routes = server::routes(cache);

    info!("server starting on port {}", port);
    info!("health check: http://localhost:{}/health", port);
    info!("resolve endpoint: POST http://localhost:{}/resolve", port);

    warp::serve(routes).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
