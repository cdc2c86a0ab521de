//! a read-only http api over stored samples.
//!
//! every request opens its own connection and closes it when the response is ready.

use {
    crate::{
        config::DbConfig,
        query::{self, MetricRow, Window, WindowError},
        store::pg_config,
    },
    axum::{
        Json, Router,
        extract::{Query, State, rejection::QueryRejection},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
    },
    postgres::{Client, NoTls},
    serde::{Deserialize, Serialize},
    serde_json::json,
    std::sync::Arc,
    thiserror::Error,
    tokio::task::{JoinError, spawn_blocking},
    tracing::error,
};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Latest {
    pub latest: MetricRow,
}

#[derive(Debug, Serialize)]
pub struct Points {
    pub points: Vec<MetricRow>,
}

/// the query string of `/api/range`.
#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub minutes: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No metrics found")]
    NotFound,
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Query(#[from] QueryRejection),
    #[error("database query failed")]
    Database(#[from] postgres::Error),
    #[error("request was cancelled")]
    Task(#[from] JoinError),
}

type Db = Arc<DbConfig>;

/// routes for `/api/health`, `/api/latest` and `/api/range`.
pub fn router(db: DbConfig) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/latest", get(latest))
        .route("/api/range", get(range))
        .with_state(Arc::new(db))
}

async fn health(State(db): State<Db>) -> Result<Json<Health>, ApiError> {
    with_client(db, query::health).await?;
    Ok(Json(Health { status: "ok" }))
}

async fn latest(State(db): State<Db>) -> Result<Json<Latest>, ApiError> {
    match with_client(db, query::latest).await? {
        Some(latest) => Ok(Json(Latest { latest })),
        None => Err(ApiError::NotFound),
    }
}

async fn range(
    State(db): State<Db>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Result<Json<Points>, ApiError> {
    let Query(RangeParams { minutes, limit }) = params?;
    let window = Window::new(minutes, limit)?;

    let points = with_client(db, move |client| query::range(client, window)).await?;
    if points.is_empty() {
        return Err(ApiError::NotFound);
    }

    Ok(Json(Points { points }))
}

/// runs `f` against a fresh connection on the blocking pool.
async fn with_client<T, F>(db: Db, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Client) -> Result<T, postgres::Error> + Send + 'static,
{
    let result = spawn_blocking(move || {
        let mut client = pg_config(&db).connect(NoTls)?;
        f(&mut client)
    })
    .await?;

    Ok(result?)
}

// === impl ApiError ===

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Window(_) | Self::Query(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, source = ?std::error::Error::source(&self), "request failed");
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
