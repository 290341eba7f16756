use axum::{
    extract::{Path, Query, State},
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
    models::user::{ListUsersQuery, LoginRequest, Profile, RegisterRequest, UpdateStatusRequest},
    services::{
        auth_service::{AuthService, ClientInfo},
        AppState,
    },
};

fn service(state: &AppState) -> AuthService {
    AuthService::new(state.store.clone(), state.jwt.clone(), state.config.bcrypt_cost)
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let auth = service(&state).register(req, client).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User registered successfully",
            "token": auth.token,
            "user": auth.user,
        })),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let auth = service(&state).login(req, client).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Login successful",
        "token": auth.token,
        "user": auth.user,
    })))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<impl IntoResponse> {
    let user = service(&state).me(&claims.sub).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

/// PUT /api/auth/update-profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(profile): AppJson<Profile>,
) -> AppResult<impl IntoResponse> {
    let user = service(&state).update_profile(&claims.sub, profile).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Profile updated successfully",
        "user": user,
    })))
}

/// GET /api/auth/user/{userId}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user = service(&state).get_user(&claims, &user_id).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

/// GET /api/auth/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<impl IntoResponse> {
    let page = service(&state).list_users(query).await?;
    Ok(Json(json!({
        "success": true,
        "users": page.users,
        "pagination": page.pagination,
    })))
}

/// PUT /api/auth/admin/users/{userId}/status
pub async fn update_user_status(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
    AppJson(req): AppJson<UpdateStatusRequest>,
) -> AppResult<impl IntoResponse> {
    tracing::info!(admin_id = %claims.sub, user_id = %user_id, status = req.status.as_str(), "Admin status change");
    let user = service(&state).update_status(&user_id, req).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("User status updated to {}", user.status.as_str()),
        "user": user,
    })))
}

/// DELETE /api/auth/admin/cleanup
pub async fn cleanup_test_users(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let deleted = service(&state).cleanup_test_users().await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Cleaned up {} test users", deleted),
        "deletedCount": deleted,
    })))
}

/// GET /api/auth/admin/analytics
pub async fn analytics(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let analytics = service(&state).analytics().await?;
    Ok(Json(json!({ "success": true, "analytics": analytics })))
}
