//! HTTP API: welcome, status and forecast endpoints.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::data::DataAccess;
use crate::ml::PersistenceError;
use crate::service::ForecastContext;

#[derive(Debug, Serialize)]
struct Welcome {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// An error returned to the client as `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// CORS layer limited to the configured origins. Unparseable origins are skipped.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

/// Create the application router
pub fn create_router<D: DataAccess + 'static>(
    context: ForecastContext<D>,
    allowed_origins: &[String],
) -> Router {
    Router::new()
        .route("/api", get(root_handler))
        .route("/api/status", get(status_handler::<D>))
        .route("/api/forecast", get(forecast_handler::<D>))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

async fn root_handler() -> Json<Welcome> {
    Json(Welcome {
        message: "Welcome to the AQI Predictor API.",
    })
}

async fn status_handler<D: DataAccess + 'static>(
    State(context): State<ForecastContext<D>>,
) -> Result<Response, ApiError> {
    match context.status() {
        Ok(status) => Ok(Json(status).into_response()),
        Err(PersistenceError::FileNotFound(_)) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "Model file not found.",
        )),
        Err(e) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

async fn forecast_handler<D: DataAccess + 'static>(
    State(context): State<ForecastContext<D>>,
) -> Result<Response, ApiError> {
    let response = context
        .generate_response()
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(response).into_response())
}

/// Run the server until it fails or the process is stopped.
pub async fn run_server<D: DataAccess + 'static>(
    context: ForecastContext<D>,
    config: &ServerConfig,
) -> Result<()> {
    let app = create_router(context, &config.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Starting API server on {}", config.bind_address);

    axum::serve(listener, app).await.context("API server failed")?;
    Ok(())
}
