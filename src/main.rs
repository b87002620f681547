use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gifts_api::{
    api::{create_router, AppState},
    cache::{create_redis_client, CacheWriterHandle, InMemoryTermCache, RedisTermCache, TermCache},
    config::Config,
    services::{
        providers::{HttpProfileExtractor, QlooClient, VectorSearchMatcher},
        BatchDeliveryController, FixedInterval, GiftPipeline, InsightsFetcher, Pacer,
        SignalBuilder, TermResolver, TokenBucket,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gifts_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let (cache, writer) = term_cache(&config)?;
    let pipeline = build_pipeline(&config, cache);
    let app = create_router(AppState::new(pipeline));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(writer) = writer {
        writer.shutdown().await;
    }

    Ok(())
}

fn term_cache(
    config: &Config,
) -> anyhow::Result<(Arc<dyn TermCache>, Option<CacheWriterHandle>)> {
    match &config.redis_url {
        Some(url) => {
            let (cache, writer) = RedisTermCache::new(create_redis_client(url)?);
            tracing::info!("Using Redis term cache");
            let cache: Arc<dyn TermCache> = Arc::new(cache);
            Ok((cache, Some(writer)))
        }
        None => {
            tracing::info!("Using in-process term cache");
            let cache: Arc<dyn TermCache> = Arc::new(InMemoryTermCache::new());
            Ok((cache, None))
        }
    }
}

fn build_pipeline(config: &Config, cache: Arc<dyn TermCache>) -> GiftPipeline {
    let qloo = Arc::new(QlooClient::new(
        config.qloo_api_key.clone(),
        config.qloo_api_url.clone(),
    ));

    let insights_pacer: Arc<dyn Pacer> = match config.insights_rate_per_second {
        Some(rate) => Arc::new(TokenBucket::new(rate, 1)),
        None => Arc::new(FixedInterval::new(config.insights_interval())),
    };

    let pipeline = GiftPipeline::new(
        TermResolver::new(
            qloo.clone(),
            cache,
            Arc::new(FixedInterval::new(config.search_interval())),
        ),
        SignalBuilder::new(),
        InsightsFetcher::new(qloo, insights_pacer),
        BatchDeliveryController::new(
            Arc::new(VectorSearchMatcher::new(config.matching_api_url.clone())),
            Arc::new(FixedInterval::new(config.batch_interval())),
            config.batch_size,
            config.match_top_k,
        ),
    );

    match &config.extraction_api_url {
        Some(url) => pipeline.with_extractor(Arc::new(HttpProfileExtractor::new(url.clone()))),
        None => {
            tracing::warn!("EXTRACTION_API_URL not set, free-text requests will be rejected");
            pipeline
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
