use crate::state::AppState;
use crate::{handlers, health};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    #[must_use]
    pub const fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/health", get(health::health))
            .route("/api/signals", get(handlers::list_signals))
            .route("/api/signals/active", get(handlers::list_active))
            .route("/api/signals/:id", get(handlers::get_signal))
            .route("/api/signals/:id/take", post(handlers::take_signal))
            .route("/api/signals/:id/feedback", post(handlers::record_feedback))
            .route("/api/risk/:symbol", get(handlers::get_risk))
            .route("/api/reputation/:symbol", get(handlers::get_reputation))
            .route("/api/patterns", get(handlers::list_patterns))
            .route("/api/performance", get(handlers::performance))
            .route("/api/backtests", post(handlers::run_backtest))
            .route("/api/backtests/:symbol", get(handlers::list_backtests))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Starts the web server listening on the specified address.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the address or serve requests.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Web API listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
