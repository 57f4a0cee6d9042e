use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod database;
mod error;
mod jobs;
mod ops;
mod queue;
mod realtime;
mod records;
mod services;
mod stores;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};

#[cfg(test)]
mod tests;

use queue::{MessageQueue, PgQueue};
use workflows::{ActionDispatcher, DeadLetterProcessor, EngineDeps, StepConsumer, TriggerConsumer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let email = if config.smtp.is_configured() {
        match services::EmailService::new(&config.smtp).await {
            Ok(service) => Some(service),
            Err(e) => {
                tracing::warn!("SMTP transport unavailable, failure alerts disabled: {}", e);
                None
            }
        }
    } else {
        tracing::warn!("SMTP not configured; tenant failure alerts disabled");
        None
    };

    let queue: Arc<dyn MessageQueue> = Arc::new(PgQueue::new(
        db_pool.clone(),
        config.queue.visibility_timeout_secs,
        config.queue.max_receive_count,
    ));

    let deps = Arc::new(EngineDeps::new(
        db_pool.clone(),
        queue,
        email,
        config.webhook_timeout_ms,
        config.app_base_url.clone(),
    ));
    let dispatcher = Arc::new(ActionDispatcher::new());

    tokio::spawn(TriggerConsumer::new(deps.clone(), config.queue.clone()).run());
    tokio::spawn(StepConsumer::new(deps.clone(), dispatcher.clone(), config.queue.clone()).run());
    tokio::spawn(DeadLetterProcessor::new(deps.clone(), config.queue.clone()).run());

    let scheduler = Arc::new(
        jobs::JobScheduler::new(
            deps.clone(),
            jobs::JobConfig {
                retention: config.retention.clone(),
                ..Default::default()
            },
        )
        .await?,
    );
    scheduler.start().await?;

    let app_state = Arc::new(ops::AppState {
        pool: db_pool,
        deps,
        dispatcher,
        scheduler,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(|| async { "Kennelflow Workflow Engine v1.0.0" }))
        .merge(ops::ops_routes())
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Engine ops server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
