use crate::cli::ServeArgs;
use crate::infra::{build_engine, AppState};
use crate::routes::with_traffic_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use spot_traffic::config::AppConfig;
use spot_traffic::error::AppError;
use spot_traffic::telemetry;
use spot_traffic::traffic::TrafficLevel;
use std::sync::atomic::{AtomicBool, Ordering};
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
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let engine = build_engine(config.engine.clone(), None);
    let _tick_log = engine.subscribe(|table| {
        let red = table
            .scores()
            .filter(|score| score.level == TrafficLevel::Red)
            .count();
        info!(
            generation = table.generation(),
            spots = table.len(),
            red,
            "congestion table refreshed"
        );
    });
    engine.start_monitoring();

    let app = with_traffic_routes(Arc::clone(&engine))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        refresh_interval_ms = config.engine.refresh_interval_ms,
        "spot traffic service ready"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    readiness_flag.store(false, Ordering::Release);
    engine.shutdown();
    info!("spot traffic service stopped");
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
