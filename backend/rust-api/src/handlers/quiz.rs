use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::quiz::{PublishRequest, QuizDetail, QuizInput},
    models::quiz_attempt::SubmitAttemptRequest,
    services::{quiz_service::QuizService, AppState},
};

fn service(state: &AppState) -> QuizService {
    QuizService::new(state.store.clone())
}

// ---- admin ----

/// POST /api/quiz/create
pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(input): AppJson<QuizInput>,
) -> AppResult<impl IntoResponse> {
    let quiz = service(&state).create_quiz(&claims.sub, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Quiz created successfully",
            "quiz": QuizDetail::from(quiz),
        })),
    ))
}

/// GET /api/quiz/all
pub async fn list_quizzes(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let quizzes = service(&state).list_all().await?;
    Ok(Json(json!({
        "success": true,
        "count": quizzes.len(),
        "quizzes": quizzes,
    })))
}

/// GET /api/quiz/{quizId}
pub async fn get_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let quiz = service(&state).get_quiz(&quiz_id).await?;
    Ok(Json(json!({ "success": true, "quiz": QuizDetail::from(quiz) })))
}

/// PUT /api/quiz/{quizId}
pub async fn update_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    AppJson(input): AppJson<QuizInput>,
) -> AppResult<impl IntoResponse> {
    let quiz = service(&state).update_quiz(&quiz_id, input).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Quiz updated successfully",
        "quiz": QuizDetail::from(quiz),
    })))
}

/// PATCH /api/quiz/{quizId}/publish
pub async fn publish_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<PublishRequest>,
) -> AppResult<impl IntoResponse> {
    let quiz = service(&state).set_published(&quiz_id, req.is_published).await?;
    let message = if quiz.is_published {
        "Quiz published successfully"
    } else {
        "Quiz unpublished successfully"
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "quiz": QuizDetail::from(quiz),
    })))
}

/// DELETE /api/quiz/{quizId}
pub async fn delete_quiz(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    service(&state).delete_quiz(&quiz_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Quiz and its attempts deleted successfully",
    })))
}

/// GET /api/quiz/{quizId}/results
pub async fn quiz_results(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let results = service(&state).quiz_results(&quiz_id).await?;
    Ok(Json(json!({ "success": true, "results": results })))
}

// ---- students ----

/// GET /api/quiz/course/{courseId}
pub async fn course_quizzes(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let quizzes = service(&state)
        .list_course_quizzes(&claims.sub, &course_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "count": quizzes.len(),
        "quizzes": quizzes,
    })))
}

/// GET /api/quiz/{quizId}/start
pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let quiz = service(&state).start_attempt(&claims.sub, &quiz_id).await?;
    Ok(Json(json!({ "success": true, "quiz": quiz })))
}

/// POST /api/quiz/{quizId}/submit
pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(quiz_id): Path<String>,
    AppJson(req): AppJson<SubmitAttemptRequest>,
) -> AppResult<impl IntoResponse> {
    let result = service(&state)
        .submit_attempt(&claims.sub, &quiz_id, req)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Quiz submitted successfully",
        "result": result,
    })))
}

/// GET /api/quiz/attempts/{courseId}
pub async fn my_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let attempts = service(&state)
        .list_user_attempts(&claims.sub, &course_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "count": attempts.len(),
        "attempts": attempts,
    })))
}
