use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use prixfixe::entities::{Recipe, Searchable, ValidIngredient, ValidInstrument, ValidPreparation};
use prixfixe::events::BroadcastPublisher;
use prixfixe::observability::IndexMetrics;
use prixfixe::store::MemoryStore;
use prixfixe::{Config, EntityIndexer, IndexProvider, Reconciler};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::health::health;
use crate::handlers::metrics::metrics_handler;
use crate::handlers::search::{entity_routes, EntityState};
use crate::handlers::AppState;
use crate::session::{attach_session, SessionMode};

const EVENT_BUS_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub config: Config,
    pub bind_addr: String,
    pub no_auth: bool,
}

/// Assemble the full application router around the given entity routes.
pub fn build_router(entities: Router, state: Arc<AppState>, mode: SessionMode) -> Router {
    let service = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    Router::new()
        .merge(service)
        .merge(entities)
        .layer(middleware::from_fn_with_state(mode, attach_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

/// Store and write path of one entity type, publishing on the server's bus.
pub struct EntityServices<T> {
    pub store: MemoryStore<T>,
    pub indexer: EntityIndexer<T>,
}

/// The assembled service: routes, per-entity write paths and the
/// reconcilers listening on the shared event bus.
pub struct Application {
    pub router: Router,
    pub valid_ingredients: EntityServices<ValidIngredient>,
    pub valid_preparations: EntityServices<ValidPreparation>,
    pub valid_instruments: EntityServices<ValidInstrument>,
    pub recipes: EntityServices<Recipe>,
    provider: IndexProvider,
    bus: BroadcastPublisher,
    reconcilers: Vec<JoinHandle<()>>,
}

/// Bind `T`'s index, give it a store, an indexer and a reconciler on `bus`,
/// and return its routes.
async fn mount<T: Searchable>(
    provider: &IndexProvider,
    bus: &BroadcastPublisher,
) -> prixfixe::Result<(Router, EntityServices<T>, JoinHandle<()>)> {
    let index = provider.provide(T::INDEX).await?;
    let store = MemoryStore::<T>::new();
    let reconciler = tokio::spawn(
        Reconciler::<T, MemoryStore<T>>::new(index.clone(), store.clone()).run(bus.subscribe()),
    );
    let indexer = EntityIndexer::new(index.clone(), Arc::new(bus.clone()));
    let routes = entity_routes(EntityState::<T, _>::new(
        index.searcher(),
        store.clone(),
        provider.use_search_service(),
    ));
    Ok((routes, EntityServices { store, indexer }, reconciler))
}

impl Application {
    pub async fn build(
        config: &Config,
        registry: Arc<prometheus::Registry>,
        no_auth: bool,
    ) -> prixfixe::Result<Self> {
        let metrics = IndexMetrics::register(&registry)?;
        let provider =
            IndexProvider::new(config.search.clone(), config.vectors.clone(), Some(metrics));
        let bus = BroadcastPublisher::new(EVENT_BUS_CAPACITY);

        let (ingredient_routes, valid_ingredients, r1) =
            mount::<ValidIngredient>(&provider, &bus).await?;
        let (preparation_routes, valid_preparations, r2) =
            mount::<ValidPreparation>(&provider, &bus).await?;
        let (instrument_routes, valid_instruments, r3) =
            mount::<ValidInstrument>(&provider, &bus).await?;
        let (recipe_routes, recipes, r4) = mount::<Recipe>(&provider, &bus).await?;

        let entities = Router::new()
            .merge(ingredient_routes)
            .merge(preparation_routes)
            .merge(instrument_routes)
            .merge(recipe_routes);
        let state = Arc::new(AppState {
            provider: config.search.provider,
            registry,
            start_time: std::time::Instant::now(),
        });

        Ok(Application {
            router: build_router(entities, state, SessionMode { no_auth }),
            valid_ingredients,
            valid_preparations,
            valid_instruments,
            recipes,
            provider,
            bus,
            reconcilers: vec![r1, r2, r3, r4],
        })
    }

    pub fn provider(&self) -> &IndexProvider {
        &self.provider
    }

    /// The bus every indexer publishes on and every reconciler reads.
    pub fn publisher(&self) -> &BroadcastPublisher {
        &self.bus
    }

    /// Close the bus, let the reconcilers drain, then close every index.
    pub async fn shutdown(self) -> prixfixe::Result<()> {
        let Application {
            router,
            valid_ingredients,
            valid_preparations,
            valid_instruments,
            recipes,
            provider,
            bus,
            reconcilers,
        } = self;
        drop((
            router,
            valid_ingredients,
            valid_preparations,
            valid_instruments,
            recipes,
            bus,
        ));
        for reconciler in reconcilers {
            if let Err(e) = reconciler.await {
                tracing::warn!(error = %e, "reconciler task ended abnormally");
            }
        }
        provider.close_all().await
    }
}

pub async fn serve(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let startup_start = std::time::Instant::now();
    let ServeOptions {
        config,
        bind_addr,
        no_auth,
    } = options;
    config.validate()?;

    let registry = Arc::new(prometheus::Registry::new());
    let app = Application::build(&config, registry, no_auth).await?;

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        bind_addr = %listener.local_addr()?,
        provider = config.search.provider.as_str(),
        no_auth,
        startup_ms = startup_start.elapsed().as_millis() as u64,
        "prixfixe search server listening"
    );

    axum::serve(listener, app.router.clone())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app.shutdown().await?;
    tracing::info!("search indexes closed, shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("received ctrl-c, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
