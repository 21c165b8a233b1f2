use std::sync::Arc;

use anyhow::bail;
use bff_http::{
    logging::init_logging,
    routes::{bff_routes, collection_routes},
    settings::OriginKind,
    ApiClient, ApiOrigin, BffService, CacheProvider, CollectionProxy, OriginProvider,
    SampleOrigin, Settings,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_logging(&settings.log_level, settings.log_json);

    let client = settings.client_config().map(ApiClient::new).transpose()?;
    let origin = match (settings.collection_origin, &client) {
        (OriginKind::Api, Some(client)) => OriginProvider::Api(ApiOrigin::new(client.clone())),
        (OriginKind::Api, None) => bail!("collection_origin = \"api\" requires an API url"),
        (OriginKind::Sample, _) => OriginProvider::Sample(SampleOrigin),
    };

    let store = CacheProvider::connect_graceful(
        settings.redis_url.as_deref(),
        settings.memory_cache_capacity,
    )
    .await;
    let proxy = CollectionProxy::new(store, origin).with_ttl(settings.cache_ttl());

    let mut app = collection_routes(Arc::new(proxy));
    match client {
        Some(client) => app = app.merge(bff_routes(BffService::new(client))),
        None => tracing::warn!("no API url configured, /api/bff endpoints are disabled"),
    }

    let listener = TcpListener::bind(&settings.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "bff server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
