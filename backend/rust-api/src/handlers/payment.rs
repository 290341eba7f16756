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
    services::{
        payment_service::{CreatePaymentRequest, PaymentService, VerifyPaymentRequest},
        AppState,
    },
};

fn service(state: &AppState) -> PaymentService {
    PaymentService::new(
        state.gateway.clone(),
        state.store.clone(),
        &state.config.payment.key_secret,
    )
}

/// POST /api/payment/create-order
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreatePaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let order = service(&state).create_gateway_order(req).await?;
    Ok(Json(json!({
        "success": true,
        "orderId": order.id,
        "amount": order.amount,
        "currency": order.currency,
    })))
}

/// POST /api/payment/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<VerifyPaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let verified = service(&state).verify(&claims, req).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Payment verified successfully",
        "paymentId": verified.payment_id,
        "orderId": verified.order_id,
    })))
}

/// GET /api/payment/status/{paymentId}
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path(payment_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let payment = service(&state).payment_status(&payment_id).await?;
    Ok(Json(json!({ "success": true, "payment": payment })))
}
