use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::AppResult,
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::certificate::{CertificateVerification, CertificateView, IssueCertificateRequest},
    services::{certificate_service::CertificateService, AppState},
};

fn service(state: &AppState) -> CertificateService {
    CertificateService::new(state.store.clone())
}

/// POST /api/certificates/issue
pub async fn issue(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<IssueCertificateRequest>,
) -> AppResult<impl IntoResponse> {
    let issued = service(&state).issue(&claims.sub, &req.course_id).await?;
    let (status, message) = if issued.is_new() {
        (StatusCode::CREATED, "Certificate generated successfully")
    } else {
        (StatusCode::OK, "Certificate already exists")
    };
    Ok((
        status,
        Json(json!({
            "success": true,
            "message": message,
            "certificate": CertificateView::from(issued.into_certificate()),
        })),
    ))
}

/// GET /api/certificates/my-certificates
pub async fn my_certificates(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
) -> AppResult<impl IntoResponse> {
    let certificates = service(&state).list_for_user(&claims.sub).await?;
    Ok(Json(json!({
        "success": true,
        "count": certificates.len(),
        "certificates": certificates,
    })))
}

/// GET /api/certificates/{certificateId}
pub async fn get_certificate(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(certificate_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let certificate = service(&state)
        .get_owned(&claims.sub, &certificate_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "certificate": CertificateView::from(certificate),
    })))
}

/// GET /api/certificates/course/{courseId}
pub async fn course_certificate(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(course_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let certificate = service(&state)
        .get_for_course(&claims.sub, &course_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "certificate": CertificateView::from(certificate),
    })))
}

/// GET /api/certificates/verify/{certificateNumber} (public)
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> AppResult<Response> {
    let response = match service(&state).find_by_number(&number).await? {
        Some(certificate) => Json(json!({
            "success": true,
            "valid": true,
            "certificate": CertificateVerification::from(certificate),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "valid": false,
                "message": "Certificate not found or invalid",
            })),
        )
            .into_response(),
    };
    Ok(response)
}

/// GET /api/certificates/admin/all
pub async fn list_all(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let certificates = service(&state).list_all().await?;
    Ok(Json(json!({
        "success": true,
        "count": certificates.len(),
        "certificates": certificates,
    })))
}
