use crate::config::Config;
use crate::images::{ImageService, ImageStore, SqliteImageStore};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use pixshare_db::pool::DbPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod error;
pub mod routes_admin;
pub mod routes_images;
pub mod routes_share;

pub use error::ApiError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Users and tokens
    pub db_pool: DbPool,
    pub images: Arc<ImageService>,
}

impl AppContext {
    /// Context with the SQLite image store over `db_pool`.
    pub fn new(config: Config, db_pool: DbPool) -> Result<Self> {
        let store = Arc::new(SqliteImageStore::new(db_pool.clone()));
        Self::with_store(config, db_pool, store)
    }

    /// Context with a caller-supplied image store.
    pub fn with_store(
        config: Config,
        db_pool: DbPool,
        store: Arc<dyn ImageStore>,
    ) -> Result<Self> {
        let images = ImageService::new(store, config.encoder.clone(), config.upload.clone())
            .context("Failed to create image service")?;
        Ok(Self {
            config: Arc::new(config),
            db_pool,
            images: Arc::new(images),
        })
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = ctx.config.upload.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_share::share_routes())
        .merge(routes_images::raw_routes())
        .nest("/api", api_routes(&ctx))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn api_routes(ctx: &AppContext) -> Router<AppContext> {
    let public_routes = auth::public_routes();

    let admin_routes = routes_admin::admin_routes()
        .layer(middleware::from_fn(auth::require_admin));

    let protected_routes = auth::session_routes()
        .merge(routes_images::image_routes())
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_auth,
        ));

    public_routes.merge(protected_routes)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server
pub async fn start_server(config: Config, db_pool: DbPool) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let public_url = config.server.public_url.clone();
    let app = create_router(AppContext::new(config, db_pool)?);

    tracing::info!("Starting server on {} (public URL {})", addr, public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
