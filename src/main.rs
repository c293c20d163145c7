use routeplane::application::{RoutingEngine, RoutingRepositories};
use routeplane::config::Config;
use routeplane::domain::media_server::{MediaFleet, MediaServerRepository};
use routeplane::domain::rate_limit::RateLimiter;
use routeplane::infrastructure::dns::DnsAddressResolver;
use routeplane::infrastructure::fleet::{reload_fleet, spawn_fleet_refresh};
use routeplane::interface::api::{build_router, init_metrics, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
use routeplane::infrastructure::persistence::{create_pool, run_migrations, PgRoutingStore};
#[cfg(not(feature = "postgres"))]
use routeplane::infrastructure::persistence::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Routeplane routing engine");

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded: {:?}", config.routing);

    let prometheus_handle = init_metrics()?;

    #[cfg(feature = "postgres")]
    let (repos, fleet_repository): (RoutingRepositories, Arc<dyn MediaServerRepository>) = {
        info!("Initializing database connection...");
        let pool = create_pool(&config.database).await?;
        run_migrations(&pool).await?;

        let store = Arc::new(PgRoutingStore::new(pool));
        let fleet_repository: Arc<dyn MediaServerRepository> = store.clone();
        (RoutingRepositories::from_store(store), fleet_repository)
    };

    #[cfg(not(feature = "postgres"))]
    let (repos, fleet_repository): (RoutingRepositories, Arc<dyn MediaServerRepository>) = {
        warn!("Built without postgres, serving from an empty in-memory store");
        let store = Arc::new(InMemoryStore::new());
        let fleet_repository: Arc<dyn MediaServerRepository> = store.clone();
        (RoutingRepositories::from_store(store), fleet_repository)
    };

    // Media fleet: initial load, then periodic refresh
    let fleet = Arc::new(MediaFleet::empty());
    match reload_fleet(fleet_repository.as_ref(), &fleet).await {
        Ok(version) => info!("Media fleet loaded (v{})", version),
        Err(e) => warn!("Initial media fleet load failed: {}", e),
    }
    let refresh = spawn_fleet_refresh(fleet_repository, fleet.clone(), config.fleet.refresh_interval());

    let engine = Arc::new(RoutingEngine::new(
        &config.routing,
        repos,
        Arc::new(DnsAddressResolver::new()),
        fleet,
    ));

    let limiter = if config.rate_limit.enabled {
        let limiter = Arc::new(
            RateLimiter::new(
                config.rate_limit.per_ip_per_minute,
                config.rate_limit.per_carrier_per_minute,
            )
            .with_carrier_credentials(config.rate_limit.carrier_credentials.clone()),
        );
        let purge = limiter.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                purge.purge_idle();
            }
        });
        Some(limiter)
    } else {
        info!("Rate limiting disabled");
        None
    };

    let app = build_router(AppState { engine }, Some(prometheus_handle), limiter);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down...");
    })
    .await?;

    refresh.abort();
    Ok(())
}
