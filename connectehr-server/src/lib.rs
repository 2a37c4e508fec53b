//! connectehr-server - SMART on FHIR proxy for Epic and Cerner
//!
//! Relays browser requests to vendor FHIR servers, performs the OAuth2
//! authorization-code exchange and keeps an append-only audit trail.

pub mod audit;
pub mod auth;
pub mod backend_services;
pub mod config;
pub mod error;
pub mod extract;
pub mod fhir_client;
pub mod handlers;
pub mod oauth;
pub mod oauth_state;
pub mod password;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use connectehr_core::Vendor;
use connectehr_store::{AuditLog, SqliteStateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use backend_services::SystemTokenCache;
use config::{ServerConfig, StateStoreKind};
use oauth_state::{MemoryStateStore, SharedStateStore, StateStore};

/// Request bodies are small JSON documents
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state
pub struct AppState {
    pub config: ServerConfig,
    /// Shared connection pool for every upstream call
    pub http: reqwest::Client,
    pub audit: Arc<Mutex<AuditLog>>,
    pub oauth_states: Box<dyn StateStore>,
    pub system_tokens: RwLock<SystemTokenCache>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        audit: AuditLog,
        oauth_states: Box<dyn StateStore>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.request_timeout_secs.max(1)))
            .user_agent(concat!("connectehr/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            http,
            audit: Arc::new(Mutex::new(audit)),
            oauth_states,
            system_tokens: RwLock::new(SystemTokenCache::new()),
        })
    }

    /// Open the audit database and the configured state store under `storage.data_dir`
    pub fn open(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&config.storage.data_dir)?;

        let audit = AuditLog::open(config.audit_db_path())?;
        let ttl = Duration::from_secs(config.oauth.state_ttl_secs.max(1) as u64);
        let oauth_states: Box<dyn StateStore> = match config.oauth.state_store {
            StateStoreKind::Memory => Box::new(MemoryStateStore::new(ttl)),
            StateStoreKind::Sqlite => Box::new(SharedStateStore::new(
                SqliteStateStore::open(config.state_db_path())?,
                ttl,
            )),
        };

        Ok(Self::new(config, audit, oauth_states)?)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("epic-authorization"),
            HeaderName::from_static("cerner-authorization"),
        ])
        .expose_headers([header::CONTENT_DISPOSITION]);

    // A wildcard cannot be combined with credentials
    if origins.is_empty() || origins.iter().any(|o| o.trim() == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// Routes of one vendor, nested under `/epic` or `/cerner`
fn vendor_routes(state: &Arc<AppState>, vendor: Vendor) -> Router<Arc<AppState>> {
    use handlers::{audit, binary, clinical, oauth, system};

    let protected = Router::new()
        .route("/patient", get(clinical::search_patient))
        .route("/patients", get(clinical::list_patients))
        .route("/patient/{id}", get(clinical::read_patient))
        .route("/practitioner", get(clinical::search_practitioner))
        .route("/practitioner/{id}", get(clinical::read_practitioner))
        .route("/observations", get(clinical::observations))
        .route(
            "/diagnostic-reports/{category}",
            get(clinical::diagnostic_reports),
        )
        .route(
            "/document-references/{kind}",
            get(clinical::document_references),
        )
        .route("/binary/{id}", get(binary::download))
        .route("/audit/log-view", post(audit::log_view))
        .route("/system/patients", get(system::search_patients))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_clinician,
        ));

    Router::new()
        .route("/login", get(oauth::login))
        .route("/callback", get(oauth::callback))
        .merge(protected)
        .layer(Extension(vendor))
}

/// Build the application router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/audit/logs", get(handlers::audit::list_logs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let mut router = Router::new()
        .route("/health", get(handlers::metadata::health_check))
        .route("/auth/login", post(handlers::auth::login))
        .merge(admin);

    for vendor in state.config.vendors.configured() {
        router = router.nest(&format!("/{}", vendor.as_str()), vendor_routes(&state, vendor));
    }

    router
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
