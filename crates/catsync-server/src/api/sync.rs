//! Sync job control surface: trigger, poll, cancel, history, price push.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use catsync_core::PriceTag;
use catsync_engine::{EngineError, JobError, JobProgress, JobStage, PriceChange, SyncOptions, SyncSummary};

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Deserialize)]
pub(super) struct StartSyncRequest {
    storefront: Option<String>,
    max_offers: Option<usize>,
}

#[derive(Debug, Serialize)]
pub(super) struct StartSyncResponse {
    status: &'static str,
}

fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    match error {
        EngineError::Job(JobError::AlreadyRunning) => ApiError::new(
            request_id,
            "conflict",
            "a sync job is already running",
        ),
        EngineError::Job(JobError::NotRunning) => {
            ApiError::new(request_id, "conflict", "no sync job is running")
        }
        EngineError::UnknownStorefront(_) | EngineError::NoStorefronts => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        EngineError::Market(e) => {
            tracing::error!(error = %e, "marketplace configuration error");
            ApiError::new(request_id, "validation_error", e.to_string())
        }
        EngineError::Db(e) => map_db_error(request_id, e),
        EngineError::SyncFailed(message) => {
            ApiError::new(request_id, "internal_error", message.clone())
        }
    }
}

/// `POST /api/v1/sync/start` — accept a job and return immediately; the
/// caller polls `/sync/progress`. 409 when a job is already running or its
/// terminal result is still retained.
pub(super) async fn start_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // The trigger body is optional; an empty POST syncs everything.
    let request: StartSyncRequest = if body.is_empty() {
        StartSyncRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(
                req_id.0.clone(),
                "bad_request",
                format!("invalid JSON body: {e}"),
            )
        })?
    };
    let options = SyncOptions {
        storefront: request.storefront,
        max_offers: request.max_offers,
        trigger_source: "api".to_owned(),
    };

    state
        .engine
        .try_start(options)
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: StartSyncResponse {
                status: "processing",
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub(super) struct ProgressDto {
    current: usize,
    total: usize,
    stage: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncProgressResponse {
    status: &'static str,
    progress: ProgressDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn stage_status(stage: JobStage) -> &'static str {
    match stage {
        JobStage::Idle => "idle",
        JobStage::Running => "processing",
        JobStage::Cancelling => "cancelling",
        JobStage::Completed => "completed",
        JobStage::Error => "error",
    }
}

fn progress_dto(progress: JobProgress) -> ProgressDto {
    ProgressDto {
        current: progress.current,
        total: progress.total,
        stage: progress.stage_label,
    }
}

/// `GET /api/v1/sync/progress` — the latest snapshot from the job registry.
pub(super) async fn sync_progress(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<SyncProgressResponse>> {
    let snapshot = state.engine.registry().snapshot();

    Json(ApiResponse {
        data: SyncProgressResponse {
            status: stage_status(snapshot.stage),
            progress: progress_dto(snapshot.progress),
            result: snapshot.result,
            error: snapshot.error,
        },
        meta: ResponseMeta::new(req_id.0),
    })
}

/// `POST /api/v1/sync/cancel` — ask the running job to stop. The job winds
/// down at the next page/batch boundary and the tracker returns to idle.
pub(super) async fn cancel_sync(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.registry().request_cancel().map_err(|e| {
        map_engine_error(req_id.0.clone(), &EngineError::Job(e))
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: StartSyncResponse {
                status: "cancelling",
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct SyncRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    sync_run_id: Uuid,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    offers_seen: i32,
    offers_synced: i32,
    offers_failed: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

/// `GET /api/v1/sync/runs` — durable run history, most recent first.
pub(super) async fn list_sync_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SyncRunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    let rows = catsync_db::list_sync_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| SyncRunItem {
            sync_run_id: row.public_id,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            offers_seen: row.offers_seen,
            offers_synced: row.offers_synced,
            offers_failed: row.offers_failed,
            error_message: row.error_message,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct PricesPushRequest {
    storefront: String,
    prices: Vec<PricePushItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PricePushItem {
    offer_id: String,
    price: String,
    currency_code: String,
}

#[derive(Debug, Serialize)]
pub(super) struct PricesPushResponse {
    updated: usize,
    errors: Vec<PricePushError>,
}

#[derive(Debug, Serialize)]
pub(super) struct PricePushError {
    offer_id: String,
    message: String,
}

/// `POST /api/v1/prices/push` — batched price write-back through one
/// storefront's marketplace adapter.
pub(super) async fn push_prices(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(request): Json<PricesPushRequest>,
) -> Result<Json<ApiResponse<PricesPushResponse>>, ApiError> {
    let changes = request
        .prices
        .into_iter()
        .map(|item| PriceChange {
            offer_id: item.offer_id,
            price: PriceTag {
                value: item.price,
                currency_code: item.currency_code,
            },
        })
        .collect();

    let outcome = state
        .engine
        .push_prices(&request.storefront, changes)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: PricesPushResponse {
            updated: outcome.updated,
            errors: outcome
                .errors
                .into_iter()
                .map(|e| PricePushError {
                    offer_id: e.offer_id,
                    message: e.message,
                })
                .collect(),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
