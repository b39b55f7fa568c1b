use crate::cli::ServeArgs;
use crate::infra::{build_orchestrator, in_memory_stores, AppState};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use screening_pipeline::config::AppConfig;
use screening_pipeline::error::AppError;
use screening_pipeline::telemetry;
use screening_pipeline::workflows::screening::PipelineApiState;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if config.pipeline.cron_secret.is_none() {
        warn!("CRON_SECRET not set, scheduled trigger will refuse every request");
    }

    let orchestrator = build_orchestrator(&config, in_memory_stores(), None)?;
    let pipeline_state = PipelineApiState {
        orchestrator: Arc::new(orchestrator),
        cron_secret: config.pipeline.cron_secret.clone(),
    };

    let app = with_pipeline_routes(pipeline_state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "screening pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
