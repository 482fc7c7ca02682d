pub mod handlers;
pub mod types;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::model::{Moderator, RetryingInvoker};
use crate::{config::Config, diagnosis::Analyzer, store::Store, Result};

pub use handlers::AppState;

pub async fn run(config: Config) -> Result<()> {
    let db_path = std::env::var("DATABASE_PATH")
        .unwrap_or_else(|_| config.server.database_path.clone());
    let store = Store::new(&db_path).await?;

    let invoker = Arc::new(RetryingInvoker::from_config(&config.ai)?);
    let analyzer: Arc<dyn Analyzer> = invoker.clone();
    let moderator: Arc<dyn Moderator> = invoker;

    let app_state = AppState {
        store: Arc::new(store),
        analyzer,
        moderator,
        sessions: Arc::new(Mutex::new(HashMap::new())),
    };

    let app = router(app_state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Full API surface; extracted from `run` so tests drive it in-process.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/diagnose", post(handlers::diagnose))
        .route("/api/analyses", post(handlers::save_analysis))
        .route("/api/users/:user_id/analyses", get(handlers::list_analyses))
        .route("/api/analyses/:analysis_id", delete(handlers::delete_analysis))
        .route("/api/analyses/:analysis_id/updates", post(handlers::append_update))
        .route("/api/analyses/:analysis_id/share", post(handlers::share_analysis))
        .route("/api/posts", get(handlers::list_posts).post(handlers::create_post))
        .route("/api/posts/:post_id", delete(handlers::delete_post))
        .route("/api/posts/:post_id/like", post(handlers::toggle_like))
        .route("/api/posts/:post_id/comments", post(handlers::add_comment))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
