use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryLoanRepository, LoggingNotificationSink};
use crate::routes::with_loan_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use p2p_lending::config::AppConfig;
use p2p_lending::error::AppError;
use p2p_lending::loans::LoanService;
use p2p_lending::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

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

    let loan_service = Arc::new(LoanService::new(
        Arc::new(InMemoryLoanRepository::default()),
        Arc::new(LoggingNotificationSink::default()),
        config.loans.clone(),
    ));

    let app = with_loan_routes(loan_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "loan service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
