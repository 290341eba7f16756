use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::course::{CourseView, CreateCourseRequest},
    services::AppState,
};

/// GET /api/courses
pub async fn list_courses(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let courses: Vec<CourseView> = state
        .store
        .list_courses()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(json!({
        "success": true,
        "count": courses.len(),
        "courses": courses,
    })))
}

/// GET /api/courses/{courseId}
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let course = state
        .store
        .find_course(&course_id)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found"))?;
    Ok(Json(json!({ "success": true, "course": CourseView::from(course) })))
}

/// POST /api/courses (admin)
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateCourseRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let course = req.into_course(Utc::now());
    state.store.insert_course(&course).await?;
    tracing::info!(course_id = %course.id, admin_id = %claims.sub, "Course created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Course created successfully",
            "course": CourseView::from(course),
        })),
    ))
}
