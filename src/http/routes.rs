//! HTTP route definitions

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use crate::app::AppState;
use crate::store::{GroceryItem, GroceryItemUpdate, NewGroceryItem, StoreError};
use crate::util::time::uptime_secs;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    // The `low-stock` route is a static segment, so axum matches it before
    // the `:id` capture and it can never be parsed as an item id.
    let groceries = Router::new()
        .route("/groceries", get(list_handler).post(create_handler))
        .route("/groceries/low-stock", get(low_stock_handler))
        .route(
            "/groceries/:id",
            get(get_handler).put(update_handler).delete(delete_handler),
        );

    let api = Router::new()
        .route("/health", get(health_handler))
        .merge(groceries);

    Router::new()
        .nest("/api", api)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS configuration - `*` allows any origin, otherwise a comma-separated
/// allowlist in CLIENT_ORIGIN
fn cors_layer(client_origin: &str) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if client_origin.trim() == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE]);
    }

    let allowed_origins: Vec<header::HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    item_count: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime_secs: uptime_secs(),
        item_count: state.groceries.count().await,
    })
}

// ============================================================================
// Grocery endpoints
// ============================================================================

/// Request body for create and update. `name` is optional here so that a
/// missing name and an empty name surface the same validation error.
#[derive(Deserialize)]
struct GroceryItemBody {
    name: Option<String>,
    description: Option<String>,
    quantity: Option<i64>,
}

#[derive(Serialize)]
struct DeleteResponse {
    message: &'static str,
}

async fn list_handler(State(state): State<AppState>) -> Json<Vec<GroceryItem>> {
    Json(state.groceries.list_all().await)
}

async fn low_stock_handler(State(state): State<AppState>) -> Json<Vec<GroceryItem>> {
    Json(state.groceries.list_low_stock().await)
}

async fn get_handler(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<GroceryItem>, AppError> {
    let item = state.groceries.get_by_id(id).await?;
    Ok(Json(item))
}

async fn create_handler(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<GroceryItemBody>, AppError>,
) -> Result<(StatusCode, Json<GroceryItem>), AppError> {
    let item = state
        .groceries
        .create(NewGroceryItem {
            name: body.name.unwrap_or_default(),
            description: body.description,
            quantity: body.quantity,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_handler(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
    WithRejection(Json(body), _): WithRejection<Json<GroceryItemBody>, AppError>,
) -> Result<Json<GroceryItem>, AppError> {
    let item = state
        .groceries
        .update(
            id,
            GroceryItemUpdate {
                name: body.name.unwrap_or_default(),
                description: body.description,
                quantity: body.quantity,
            },
        )
        .await?;

    Ok(Json(item))
}

async fn delete_handler(
    State(state): State<AppState>,
    WithRejection(Path(id), _): WithRejection<Path<i64>, AppError>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.groceries.delete(id).await?;
    Ok(Json(DeleteResponse {
        message: "Item deleted successfully",
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Item not found")]
    NotFound,

    #[error("Internal server error")]
    Internal,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmptyName | StoreError::NegativeQuantity => {
                AppError::BadRequest(err.to_string())
            }
            StoreError::NotFound(_) => AppError::NotFound,
            // Storage details (paths, io errors) go to the log, never to
            // the client.
            StoreError::Io(_) | StoreError::Snapshot(_) => {
                error!(error = %err, "grocery store failure");
                AppError::Internal
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        AppError::BadRequest("Item id must be an integer".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
