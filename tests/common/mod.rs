use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use prixfixe::entities::{Searchable, ValidIngredient};
use prixfixe::events::BroadcastPublisher;
use prixfixe::indexing::Requester;
use prixfixe::store::MemoryStore;
use prixfixe::{EntityIndexer, IndexProvider, SearchConfig, SearchProvider};
use prixfixe_http::handlers::search::{entity_routes, EntityState};
use prixfixe_http::handlers::AppState;
use prixfixe_http::session::SessionMode;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const USER_HEADER: &str = prixfixe_http::session::USER_HEADER;
pub const HOUSEHOLD_HEADER: &str = prixfixe_http::session::HOUSEHOLD_HEADER;

/// A running HTTP server over an embedded valid-ingredients index.
#[allow(dead_code)]
pub struct TestServer {
    pub addr: String,
    pub provider: Arc<IndexProvider>,
    pub store: MemoryStore<ValidIngredient>,
    pub indexer: EntityIndexer<ValidIngredient>,
    pub bus: BroadcastPublisher,
    pub tmp: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Write `record` to the store, then index it the way an entity service
    /// would after committing.
    pub async fn create(&self, record: ValidIngredient) {
        self.store.insert(record.clone());
        self.indexer
            .on_created(&record, &Requester::new("user-1", record.household()))
            .await
            .unwrap();
    }

    pub async fn archive(&self, record: &ValidIngredient) {
        self.store.archive(&record.id());
        self.indexer
            .on_archived(record, &Requester::new("user-1", record.household()))
            .await
            .unwrap();
    }

    pub fn search_url(&self, query: &str) -> String {
        format!(
            "http://{}/api/v1/valid_ingredients/search?q={}",
            self.addr, query
        )
    }
}

#[allow(dead_code)]
pub async fn spawn_server() -> TestServer {
    spawn_server_with(SearchProvider::Embedded, false).await
}

pub async fn spawn_server_with(provider_kind: SearchProvider, use_search_service: bool) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(IndexProvider::new(
        SearchConfig {
            provider: provider_kind,
            index_path: tmp.path().to_path_buf(),
            use_search_service,
        },
        None,
        None,
    ));
    let index = provider
        .provide(ValidIngredient::INDEX)
        .await
        .unwrap();
    let store = MemoryStore::<ValidIngredient>::new();
    let bus = BroadcastPublisher::new(64);
    let indexer = EntityIndexer::new(index.clone(), Arc::new(bus.clone()));

    let routes = entity_routes(EntityState::<ValidIngredient, _>::new(
        index.searcher(),
        store.clone(),
        use_search_service,
    ));
    let state = Arc::new(AppState {
        provider: provider_kind,
        registry: Arc::new(prometheus::Registry::new()),
        start_time: std::time::Instant::now(),
    });
    let app: Router = prixfixe_http::build_router(routes, state, SessionMode { no_auth: false });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        addr,
        provider,
        store,
        indexer,
        bus,
        tmp,
    }
}

#[allow(dead_code)]
pub fn ingredient(id: &str, name: &str, household: u64) -> ValidIngredient {
    ValidIngredient {
        id: id.to_string(),
        name: name.to_string(),
        plural_name: format!("{name}s"),
        description: String::new(),
        warning: String::new(),
        icon_path: String::new(),
        slug: name.replace(' ', "-"),
        shopping_suggestions: String::new(),
        storage_instructions: String::new(),
        contains_dairy: false,
        is_liquid: false,
        animal_flesh: false,
        belongs_to_household: Some(household),
        created_at: Utc::now(),
        last_updated_at: None,
        archived_at: None,
    }
}
