//! HTTP request handlers
//!
//! Implements the REST API a UI uses to drive and query the CGM session.

use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::Settings;
use crate::controller::CgmController;
use crate::error::{AppError, AppResult};
use crate::fhir;
use crate::metrics::{DEFAULT_WINDOW_HOURS, GMI_WINDOW_HOURS};
use crate::models::{
    Alert, CgmSettings, ConnectionStatus, Device, DeviceType, HealthCheck, Reading, ReadingInput,
    SettingsUpdate, TimeInRange,
};
use crate::validation::{validate_pagination, validate_window_hours};
use crate::websocket::WsSession;

/// Configure all application routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(err.to_string()).into()
    }))
    .service(
        web::scope("/api")
            // Health check
            .route("/health", web::get().to(health_check))
            // Session endpoints
            .service(
                web::scope("/cgm")
                    .route("/status", web::get().to(get_status))
                    .route("/connect", web::post().to(connect_device))
                    .route("/disconnect", web::post().to(disconnect_device))
                    .route("/simulation/start", web::post().to(start_simulation))
                    .route("/simulation/stop", web::post().to(stop_simulation))
                    .route("/readings/current", web::get().to(get_current_reading))
                    .route("/readings", web::get().to(get_readings))
                    .route("/readings", web::post().to(ingest_reading))
                    .route("/metrics", web::get().to(get_metrics_summary))
                    .route("/metrics/time-in-range", web::get().to(get_time_in_range))
                    .route("/metrics/average", web::get().to(get_average_glucose))
                    .route("/metrics/gmi", web::get().to(get_gmi))
                    .route("/alerts", web::get().to(get_alerts))
                    .route("/alerts", web::delete().to(clear_alerts))
                    .route("/alerts/{id}/acknowledge", web::post().to(acknowledge_alert))
                    .route("/settings", web::get().to(get_settings))
                    .route("/settings", web::patch().to(update_settings)),
            )
            // FHIR endpoints
            .route("/fhir/Observation/latest", web::get().to(get_fhir_latest))
            .route("/fhir/Observation/bundle", web::get().to(get_fhir_bundle)),
    )
    // WebSocket endpoint
    .route("/ws", web::get().to(websocket_handler));
}

/// Health check endpoint
///
/// GET /api/health
pub async fn health_check(controller: web::Data<CgmController>) -> Result<HttpResponse, AppError> {
    let state = controller.state().await;

    let health = HealthCheck {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        connection_status: state.status(),
        last_reading: state.last_reading_time(),
    };

    Ok(HttpResponse::Ok().json(health))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ConnectionStatus,
    pub device: Option<Device>,
    pub simulating: bool,
    pub total_readings: u64,
}

/// GET /api/cgm/status
pub async fn get_status(controller: web::Data<CgmController>) -> Result<HttpResponse, AppError> {
    let state = controller.state().await;

    Ok(HttpResponse::Ok().json(StatusResponse {
        status: state.status(),
        device: state.device().cloned(),
        simulating: state.is_simulating(),
        total_readings: state.total_readings(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub device_type: DeviceType,
}

/// Pair with a device; responds once pairing completes
///
/// POST /api/cgm/connect
pub async fn connect_device(
    controller: web::Data<CgmController>,
    body: web::Json<ConnectRequest>,
) -> Result<HttpResponse, AppError> {
    info!(device_type = ?body.device_type, "Received connect request");
    let device = controller.connect_device(body.device_type).await?;
    Ok(HttpResponse::Ok().json(device))
}

/// POST /api/cgm/disconnect
pub async fn disconnect_device(
    controller: web::Data<CgmController>,
) -> Result<HttpResponse, AppError> {
    controller.disconnect_device().await;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/cgm/simulation/start
pub async fn start_simulation(
    controller: web::Data<CgmController>,
) -> Result<HttpResponse, AppError> {
    controller.start_simulation().await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/cgm/simulation/stop
pub async fn stop_simulation(
    controller: web::Data<CgmController>,
) -> Result<HttpResponse, AppError> {
    controller.stop_simulation().await;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/cgm/readings/current
pub async fn get_current_reading(
    controller: web::Data<CgmController>,
) -> Result<HttpResponse, AppError> {
    let state = controller.state().await;

    match state.current_reading() {
        Some(reading) => Ok(HttpResponse::Ok().json(reading)),
        None => Err(AppError::NotFound("No glucose readings available".to_string())),
    }
}

/// Query parameters for reading history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub hours: Option<u32>,
}

#[derive(Serialize)]
struct PaginatedResponse<T> {
    data: Vec<T>,
    page: u32,
    limit: u32,
    total: u32,
    total_pages: u32,
}

/// Readings in a window, newest first
///
/// GET /api/cgm/readings?hours=24&page=1&limit=288
pub async fn get_readings(
    controller: web::Data<CgmController>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let (page, limit) = validate_pagination(query.page, query.limit)?;
    let hours = validate_window_hours(query.hours, DEFAULT_WINDOW_HOURS)?;

    let readings: Vec<Reading> = controller.state().await.readings_for_period(hours);

    let total = readings.len();
    let start = ((page - 1) as usize).saturating_mul(limit as usize);
    let paginated: Vec<Reading> = readings
        .into_iter()
        .skip(start)
        .take(limit as usize)
        .collect();

    Ok(HttpResponse::Ok().json(PaginatedResponse {
        data: paginated,
        page,
        limit,
        total: total as u32,
        total_pages: ((total as f64) / (limit as f64)).ceil() as u32,
    }))
}

/// Ingest a reading from a hardware sensor
///
/// POST /api/cgm/readings
pub async fn ingest_reading(
    controller: web::Data<CgmController>,
    body: web::Json<ReadingInput>,
    req: HttpRequest,
) -> Result<HttpResponse, AppError> {
    let correlation_id = extract_correlation_id(&req);
    info!(correlation_id = %correlation_id, value = body.value, "Received reading ingestion request");

    let reading = controller.ingest_reading(&body).await?;

    info!(
        correlation_id = %correlation_id,
        reading_id = %reading.id,
        "Reading ingested successfully"
    );
    Ok(HttpResponse::Created().json(reading))
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub hours: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeInRangeResponse {
    pub hours: u32,
    #[serde(flatten)]
    pub time_in_range: TimeInRange,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AverageResponse {
    pub hours: u32,
    pub average_glucose: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GmiResponse {
    pub window_hours: u32,
    pub gmi: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub hours: u32,
    pub time_in_range: TimeInRange,
    pub average_glucose: Option<u16>,
    pub gmi: Option<f64>,
}

/// GET /api/cgm/metrics/time-in-range?hours=24
pub async fn get_time_in_range(
    controller: web::Data<CgmController>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, AppError> {
    let hours = validate_window_hours(query.hours, DEFAULT_WINDOW_HOURS)?;
    let time_in_range = controller.state().await.time_in_range(hours);
    Ok(HttpResponse::Ok().json(TimeInRangeResponse { hours, time_in_range }))
}

/// GET /api/cgm/metrics/average?hours=24
pub async fn get_average_glucose(
    controller: web::Data<CgmController>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, AppError> {
    let hours = validate_window_hours(query.hours, DEFAULT_WINDOW_HOURS)?;
    let average_glucose = controller.state().await.average_glucose(hours);
    Ok(HttpResponse::Ok().json(AverageResponse { hours, average_glucose }))
}

/// GET /api/cgm/metrics/gmi
pub async fn get_gmi(controller: web::Data<CgmController>) -> Result<HttpResponse, AppError> {
    let gmi = controller.state().await.gmi();
    Ok(HttpResponse::Ok().json(GmiResponse {
        window_hours: GMI_WINDOW_HOURS,
        gmi,
    }))
}

/// GET /api/cgm/metrics
pub async fn get_metrics_summary(
    controller: web::Data<CgmController>,
) -> Result<HttpResponse, AppError> {
    let state = controller.state().await;
    Ok(HttpResponse::Ok().json(MetricsSummary {
        hours: DEFAULT_WINDOW_HOURS,
        time_in_range: state.time_in_range(DEFAULT_WINDOW_HOURS),
        average_glucose: state.average_glucose(DEFAULT_WINDOW_HOURS),
        gmi: state.gmi(),
    }))
}

/// GET /api/cgm/alerts
pub async fn get_alerts(controller: web::Data<CgmController>) -> Result<HttpResponse, AppError> {
    let alerts: Vec<Alert> = controller.state().await.alerts().cloned().collect();
    Ok(HttpResponse::Ok().json(alerts))
}

/// POST /api/cgm/alerts/{id}/acknowledge
pub async fn acknowledge_alert(
    controller: web::Data<CgmController>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    controller.acknowledge_alert(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /api/cgm/alerts
pub async fn clear_alerts(controller: web::Data<CgmController>) -> Result<HttpResponse, AppError> {
    controller.clear_alerts().await;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/cgm/settings
pub async fn get_settings(controller: web::Data<CgmController>) -> Result<HttpResponse, AppError> {
    let settings: CgmSettings = controller.state().await.settings().clone();
    Ok(HttpResponse::Ok().json(settings))
}

/// PATCH /api/cgm/settings
pub async fn update_settings(
    controller: web::Data<CgmController>,
    body: web::Json<SettingsUpdate>,
) -> Result<HttpResponse, AppError> {
    let settings = controller.update_settings(&body).await?;
    Ok(HttpResponse::Ok().json(settings))
}

/// Newest reading as a FHIR Observation
///
/// GET /api/fhir/Observation/latest
pub async fn get_fhir_latest(
    controller: web::Data<CgmController>,
    config: web::Data<Settings>,
) -> Result<HttpResponse, AppError> {
    let state = controller.state().await;

    let reading = state
        .current_reading()
        .ok_or_else(|| AppError::NotFound("No glucose readings available".to_string()))?;

    let observation = fhir::to_glucose_observation(
        reading,
        state.settings(),
        state.device(),
        &config.fhir.patient_reference,
    );

    Ok(HttpResponse::Ok()
        .content_type("application/fhir+json")
        .json(observation))
}

/// Readings in a window plus the GMI as a FHIR Bundle
///
/// GET /api/fhir/Observation/bundle?hours=24
pub async fn get_fhir_bundle(
    controller: web::Data<CgmController>,
    config: web::Data<Settings>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, AppError> {
    let hours = validate_window_hours(query.hours, DEFAULT_WINDOW_HOURS)?;
    let bundle = build_fhir_bundle(&controller, &config.fhir.patient_reference, hours).await?;

    Ok(HttpResponse::Ok()
        .content_type("application/fhir+json")
        .json(bundle))
}

async fn build_fhir_bundle(
    controller: &CgmController,
    patient_reference: &str,
    hours: u32,
) -> AppResult<fhir::FhirBundle> {
    let state = controller.state().await;

    let readings = state.readings_for_period(hours);
    if readings.is_empty() {
        return Err(AppError::NotFound(format!(
            "No glucose readings in the last {} hours",
            hours
        )));
    }

    let mut observations: Vec<fhir::FhirObservation> = readings
        .iter()
        .map(|r| fhir::to_glucose_observation(r, state.settings(), state.device(), patient_reference))
        .collect();

    if let Some(gmi) = state.gmi() {
        observations.push(fhir::to_gmi_observation(
            gmi,
            GMI_WINDOW_HOURS,
            chrono::Utc::now(),
            patient_reference,
        ));
    }

    Ok(fhir::to_fhir_bundle(observations))
}

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn websocket_handler(
    req: HttpRequest,
    stream: web::Payload,
    controller: web::Data<CgmController>,
) -> Result<HttpResponse, actix_web::Error> {
    let client_id = Uuid::new_v4().to_string();

    info!(client_id = %client_id, "WebSocket connection request");

    let ws_session = WsSession::new(client_id, controller.get_ref().clone());

    actix_web_actors::ws::start(ws_session, &req, stream)
}

/// Extract or generate correlation ID from request headers
fn extract_correlation_id(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Correlation-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
