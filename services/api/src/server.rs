use crate::cli::ServeArgs;
use crate::infra::{load_snapshot, AppState, Runtime};
use crate::routes::with_compliance_routes;
use crate::scheduler::spawn_sweep_task;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use stayguard::config::AppConfig;
use stayguard::error::AppError;
use stayguard::telemetry;
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

    let snapshot = load_snapshot(args.snapshot.as_ref())?;
    let runtime = Arc::new(Runtime::build(&config, snapshot, args.snapshot.clone())?);

    if config.admin.token.is_none() {
        warn!("APP_ADMIN_TOKEN is unset; the on-demand sweep route is disabled");
    }

    let app = with_compliance_routes(&runtime, config.admin.token.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    if config.sweep.enabled {
        spawn_sweep_task(runtime.clone(), config.sweep.interval);
        info!(interval_secs = config.sweep.interval.as_secs(), "compliance sweep scheduled");
    } else {
        info!("SWEEP_ENABLED is false; compliance sweeps run on demand only");
    }

    readiness_flag.store(true, Ordering::Release);
    info!(?config.environment, %addr, "stay compliance service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
