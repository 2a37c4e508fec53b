//! connectehr-server entry point

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use connectehr_server::{
    build_router,
    config::{LogFormat, ServerConfig},
    password::hash_password,
    AppState,
};

const CONFIG_ENV: &str = "CONNECTEHR_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

fn config_path() -> Option<String> {
    std::env::var(CONFIG_ENV).ok().or_else(|| {
        std::path::Path::new(DEFAULT_CONFIG_FILE)
            .exists()
            .then(|| DEFAULT_CONFIG_FILE.to_string())
    })
}

fn init_tracing(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// `connectehr-server hash-password <password>`
fn run_hash_password(password: Option<String>) -> ! {
    let Some(password) = password else {
        eprintln!("usage: connectehr-server hash-password <password>");
        std::process::exit(2);
    };
    match hash_password(&password) {
        Ok(hash) => {
            println!("{}", hash);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Failed to hash password: {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("hash-password") {
        run_hash_password(args.next());
    }

    let path = config_path();
    let config = match ServerConfig::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", path.as_deref().unwrap_or("-"), e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);
    tracing::info!("Starting connectehr-server...");

    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let vendors = config.vendors.configured();

    let state = AppState::open(config).unwrap_or_else(|e| {
        tracing::error!("Failed to initialize application state: {}", e);
        std::process::exit(1);
    });

    if vendors.is_empty() {
        tracing::warn!("No EHR vendors configured; only /health and /auth routes are served");
    }
    for vendor in &vendors {
        tracing::info!("Vendor: {} → /{}", vendor.display_name(), vendor.as_str());
    }
    tracing::info!(
        "Auth: {}",
        if state.config.auth.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    tracing::info!(
        "OAuth state store: {:?}, audit: {}",
        state.config.oauth.state_store,
        if state.config.audit.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let app = build_router(Arc::new(state));

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap_or_else(|e| {
        tracing::error!("Server error: {}", e);
    });

    tracing::info!("Server shut down gracefully");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
