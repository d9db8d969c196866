//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "REST surface over the device gateways."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Thin controllers: every handler resolves a gateway by name, rejects the request with
//! `423 Locked` while a guarded operation is in flight, and maps the resulting
//! [`OperationStatus`] onto an HTTP status.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode as HttpStatus};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use devgw_core::{DeviceGateway, OperationStatus, PropertyReading, StatusCode};
use devgw_devices::GatewaySet;
use devgw_metrics::SharedRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared API state exposed to handlers.
pub struct ApiState {
    gateways: GatewaySet,
    metrics: Option<SharedRegistry>,
}

impl ApiState {
    pub fn new(gateways: GatewaySet) -> Self {
        Self {
            gateways,
            metrics: None,
        }
    }

    /// Attach a Prometheus registry exposed at `/metrics`.
    pub fn with_metrics(mut self, registry: SharedRegistry) -> Self {
        self.metrics = Some(registry);
        self
    }

    fn gateway(&self, name: &str) -> Result<Arc<dyn DeviceGateway>, ApiError> {
        self.gateways
            .get(name)
            .ok_or_else(|| ApiError::new(HttpStatus::NOT_FOUND, format!("unknown device '{name}'")))
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("gateways", &self.gateways)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Routes served by [`spawn_api_server`].
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/gateways", get(list_gateways))
        .route("/api/:device", get(get_data))
        .route("/api/:device/status", get(get_status))
        .route("/api/:device/views/:view", get(get_view))
        .route("/api/:device/views/:view/:property", get(get_view_property))
        .route(
            "/api/:device/properties/:name",
            get(read_property).put(write_property),
        )
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve the REST API until [`ApiServer::shutdown`].
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let app = router(state);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// HTTP status reported for a gateway status.
pub fn http_status(code: StatusCode) -> HttpStatus {
    match code {
        StatusCode::Good => HttpStatus::OK,
        StatusCode::BadNotFound => HttpStatus::NOT_FOUND,
        StatusCode::BadUnknownResponse
        | StatusCode::BadDecodingError
        | StatusCode::BadDeviceFailure => HttpStatus::BAD_GATEWAY,
        StatusCode::BadNoCommunication | StatusCode::BadCommunicationError => {
            HttpStatus::SERVICE_UNAVAILABLE
        }
        StatusCode::BadInternalError | StatusCode::Bad | StatusCode::Uncertain => {
            HttpStatus::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Serialize)]
struct GatewaySummary {
    name: &'static str,
    status: OperationStatus,
    locked: bool,
    startup_ok: bool,
    views: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct DataResponse {
    status: OperationStatus,
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct DataQuery {
    #[serde(default)]
    update: bool,
}

#[derive(Debug, Deserialize)]
struct WriteRequest {
    value: Value,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: HttpStatus,
    message: String,
}

impl ApiError {
    fn new(status: HttpStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

fn ensure_unlocked(gateway: &dyn DeviceGateway) -> Result<(), ApiError> {
    if gateway.is_locked() {
        return Err(ApiError::new(
            HttpStatus::LOCKED,
            format!("{} is busy with another operation", gateway.name()),
        ));
    }
    Ok(())
}

async fn list_gateways(State(state): State<Arc<ApiState>>) -> Json<Vec<GatewaySummary>> {
    let summaries = state
        .gateways
        .iter()
        .map(|gateway| GatewaySummary {
            name: gateway.name(),
            status: gateway.status(),
            locked: gateway.is_locked(),
            startup_ok: gateway.is_startup_ok(),
            views: gateway.view_names(),
        })
        .collect();
    Json(summaries)
}

async fn get_data(
    State(state): State<Arc<ApiState>>,
    Path(device): Path<String>,
    Query(query): Query<DataQuery>,
) -> Result<Response, ApiError> {
    let gateway = state.gateway(&device)?;
    if !query.update {
        let body = DataResponse {
            status: gateway.status(),
            data: gateway.data(),
        };
        return Ok(Json(body).into_response());
    }
    ensure_unlocked(gateway.as_ref())?;
    let status = gateway.read_all().await;
    let code = http_status(status.code());
    let body = DataResponse {
        status,
        data: gateway.data(),
    };
    Ok((code, Json(body)).into_response())
}

async fn get_status(
    State(state): State<Arc<ApiState>>,
    Path(device): Path<String>,
) -> Result<Json<OperationStatus>, ApiError> {
    Ok(Json(state.gateway(&device)?.status()))
}

async fn get_view(
    State(state): State<Arc<ApiState>>,
    Path((device, view)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    state
        .gateway(&device)?
        .view(&view)
        .map(Json)
        .ok_or_else(|| ApiError::new(HttpStatus::NOT_FOUND, format!("unknown view '{view}'")))
}

async fn get_view_property(
    State(state): State<Arc<ApiState>>,
    Path((device, view, property)): Path<(String, String, String)>,
) -> Result<Json<Value>, ApiError> {
    state
        .gateway(&device)?
        .view_property(&view, &property)
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                HttpStatus::NOT_FOUND,
                format!("unknown property '{view}/{property}'"),
            )
        })
}

async fn read_property(
    State(state): State<Arc<ApiState>>,
    Path((device, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let gateway = state.gateway(&device)?;
    ensure_unlocked(gateway.as_ref())?;
    let reading: PropertyReading = gateway.read_property(&name).await;
    let code = http_status(reading.status.code());
    Ok((code, Json(reading)).into_response())
}

async fn write_property(
    State(state): State<Arc<ApiState>>,
    Path((device, name)): Path<(String, String)>,
    Json(request): Json<WriteRequest>,
) -> Result<Response, ApiError> {
    let gateway = state.gateway(&device)?;
    ensure_unlocked(gateway.as_ref())?;
    let value = match request.value {
        Value::String(text) => text,
        other => other.to_string(),
    };
    let status = gateway.write_property(&name, &value).await;
    let code = http_status(status.code());
    Ok((code, Json(status)).into_response())
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(registry) = &state.metrics else {
        return (
            HttpStatus::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };
    match devgw_metrics::encode(registry) {
        Ok(body) => (
            HttpStatus::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(devgw_metrics::content_type()),
            )],
            body,
        )
            .into_response(),
        Err(_) => HttpStatus::INTERNAL_SERVER_ERROR.into_response(),
    }
}
