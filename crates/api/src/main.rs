use std::sync::Arc;

use anyhow::Context;

use stockwise_infra::jobs::{
    InMemoryJobStore, JobExecutor, JobExecutorConfig, JobStore, SweepScheduler,
    register_expiry_handler,
};
use stockwise_infra::{Services, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load configuration")?;
    stockwise_observability::init(&settings.logging);

    if settings.server.jwt_secret == "dev-secret" {
        tracing::warn!("STOCKWISE__SERVER__JWT_SECRET not set; using insecure dev default");
    }

    let services = Arc::new(Services::new(&settings));

    let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let mut executor = JobExecutor::new(jobs.clone());
    register_expiry_handler(&mut executor, services.reservations.clone());
    let executor = executor
        .spawn(JobExecutorConfig::default().with_poll_interval(settings.jobs.poll_interval()))
        .context("failed to start job executor")?;
    let scheduler = SweepScheduler::new(services.store.clone(), jobs, settings.jobs.max_attempts)
        .with_completed_retention(settings.jobs.completed_retention())
        .spawn(settings.jobs.sweep_interval())
        .context("failed to start sweep scheduler")?;

    let app = stockwise_api::app::build_app(&settings.server.jwt_secret, services);

    let listener = tokio::net::TcpListener::bind(&settings.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.server.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    tracing::info!("shutting down background jobs");
    scheduler.shutdown();
    executor.shutdown();
    Ok(())
}
