use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::progress::RecordProgressRequest,
    services::{progress_service::ProgressService, AppState},
};

/// GET /api/video/course/{courseId}
pub async fn course_content(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let view = ProgressService::new(state.store.clone())
        .course_with_progress(&claims.sub, &course_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "course": view.course,
        "progress": view.progress,
    })))
}

/// POST /api/video/progress
pub async fn record_progress(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<RecordProgressRequest>,
) -> AppResult<impl IntoResponse> {
    let progress = ProgressService::new(state.store.clone())
        .record_progress(&claims.sub, req)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Progress updated successfully",
        "progress": progress,
    })))
}
