use axum::Router;
use signalstack::config::{Config, PriceSourceKind, SignalSourceKind};
use signalstack::services::{Ledger, MarketData, RevaluationScheduler, SqliteLedgerStore};
use signalstack::sources::{
    CoinGeckoPriceSource, PriceSource, SignalSource, StaticPriceSource, StaticSignalSource,
    TrendSignalSource,
};
use signalstack::{api, AppState};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalstack=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Arc::new(Config::from_env());
    info!("Starting SignalStack on {}:{}", config.host, config.port);

    // Market data sources
    let price_source: Arc<dyn PriceSource> = match config.market.price_source {
        PriceSourceKind::CoinGecko => {
            info!("Using CoinGecko price source");
            Arc::new(CoinGeckoPriceSource::new(
                config.market.coingecko_api_key.clone(),
                config.market.cache_ttl,
                config.market.fetch_timeout,
            ))
        }
        PriceSourceKind::Static => {
            info!(
                "Using static price source with {} prices",
                config.market.static_prices.len()
            );
            Arc::new(StaticPriceSource::new(config.market.static_prices.clone()))
        }
    };
    let signal_source: Arc<dyn SignalSource> = match config.market.signal_source {
        SignalSourceKind::Trend => Arc::new(TrendSignalSource::new(
            price_source.clone(),
            config.market.trend_window,
            config.scheduler.interval,
        )),
        SignalSourceKind::Static => Arc::new(StaticSignalSource::new(HashMap::new())),
    };
    let market = Arc::new(MarketData::new(
        price_source,
        signal_source,
        config.market.fetch_timeout,
    ));

    // Ledger backed by SQLite
    let store = Arc::new(SqliteLedgerStore::new(&config.database_path)?);
    info!("Ledger database at {}", config.database_path);
    let ledger = Arc::new(Ledger::load(config.ledger.clone(), market, store)?);

    // Start background revaluation
    let scheduler = Arc::new(RevaluationScheduler::new(
        ledger.clone(),
        config.scheduler.interval,
    ));
    if config.scheduler.enabled {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.start().await;
        });
    } else {
        info!("Revaluation scheduler disabled");
    }

    let state = AppState {
        config: config.clone(),
        ledger,
    };

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("SignalStack listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    Ok(())
}

async fn shutdown_signal(scheduler: Arc<RevaluationScheduler>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    scheduler.stop();
}
