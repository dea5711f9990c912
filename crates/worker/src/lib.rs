//! Task worker with inspection endpoints and observability.
//!
//! Runs the polling scheduler over the task runtime and serves health,
//! Prometheus metrics and read-only views of tasks and transactions.

pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use domain::TaskName;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    Collaborators, InMemoryMailer, InMemoryPaymentGateway, InMemoryReservationService,
    ReturnPolicy, SagaServices,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use store::{Repositories, StoreError};
use tasks::{Notifier, TaskRegistry, TaskRuntime};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Shared state of the inspection endpoints.
pub struct AppState {
    pub repositories: Repositories,
    /// `postgres` or `memory`.
    pub storage: &'static str,
    pub task_handlers: Vec<TaskName>,
}

impl AppState {
    pub fn new(engine: &Engine, storage: &'static str) -> Self {
        Self {
            repositories: engine.repositories.clone(),
            storage,
            task_handlers: engine.runtime.registry().names(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::status::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::status::health))
        .route("/tasks/{id}", get(routes::tasks::get))
        .route("/transactions/{type}/{id}", get(routes::transactions::get))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// The saga services and the task runtime over one set of repositories.
#[derive(Clone)]
pub struct Engine {
    pub repositories: Repositories,
    pub services: SagaServices,
    pub runtime: TaskRuntime,
}

impl Engine {
    pub fn new(
        repositories: Repositories,
        collaborators: &Collaborators,
        return_policy: Arc<dyn ReturnPolicy>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let services = SagaServices::new(&repositories, collaborators, return_policy);
        let runtime = TaskRuntime::new(
            repositories.tasks.clone(),
            TaskRegistry::for_saga(services.orders.clone()),
            notifier,
        );
        Self {
            repositories,
            services,
            runtime,
        }
    }
}

/// Collaborators backed by the in-memory doubles.
pub fn in_memory_collaborators() -> Collaborators {
    Collaborators {
        payments: Arc::new(InMemoryPaymentGateway::new()),
        reservations: Arc::new(InMemoryReservationService::new()),
        mailer: Arc::new(InMemoryMailer::new()),
    }
}

/// Opens the configured storage.
///
/// With a `DATABASE_URL` this connects a pool, applies migrations and returns
/// the pool so it can be closed on shutdown; otherwise storage is in memory.
pub async fn connect(config: &Config) -> Result<(Repositories, Option<PgPool>), StoreError> {
    let Some(url) = &config.database_url else {
        return Ok((Repositories::in_memory(), None));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;
    store::run_migrations(&pool).await?;
    tracing::info!(
        max_connections = config.database_max_connections,
        "connected to PostgreSQL"
    );
    Ok((Repositories::postgres(pool.clone()), Some(pool)))
}
