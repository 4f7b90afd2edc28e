use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::clock::SystemClock;
use crate::config::{Config, MonitorSettings};
use crate::error::{Error, Result};
use crate::handlers::{health_check, metrics, not_found, AppState};
use crate::key_generator::KeyGenerator;
use crate::middleware::{monitoring_middleware, rate_limit_middleware};
use crate::sweeper::Sweeper;

/// Build the router. Requests pass the limiter before they are timed and
/// monitored.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit_middleware,
                ))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    monitoring_middleware,
                )),
        )
        .with_state(state)
}

pub struct Server {
    bind_addr: SocketAddr,
    state: AppState,
    settings: MonitorSettings,
}

impl Server {
    pub fn new(config: &Config, settings: MonitorSettings) -> Self {
        let state = AppState::new(
            &settings,
            KeyGenerator::new(config.key_strategy),
            Arc::new(SystemClock),
        );

        Self {
            bind_addr: config.bind_addr,
            state,
            settings,
        }
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr)
            .await
            .map_err(|e| {
                Error::Configuration(format!("Failed to bind {}: {}", self.bind_addr, e))
            })?;

        let sweepers = vec![
            Sweeper::spawn(self.state.limiter.clone(), self.settings.limiter.sweep_interval),
            Sweeper::spawn(self.state.cache.clone(), self.settings.cache.sweep_interval),
        ];

        tracing::info!("Monitor server listening on {}", self.bind_addr);
        tracing::info!(
            requests_per_minute = self.settings.limiter.requests_per_minute,
            key_strategy = ?self.state.key_generator.strategy(),
            "Rate limiting enabled"
        );
        tracing::info!("Health check available at /health");
        tracing::info!("Metrics available at /metrics");

        let app = create_app(self.state);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        for sweeper in sweepers {
            sweeper.shutdown().await;
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install signal handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
