use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    extractors::AppJson,
    middlewares::auth::JwtClaims,
    models::order::{
        CompleteOrderRequest, CreateOrderRequest, FailOrderRequest, ListOrdersQuery, OrderView,
    },
    services::{ensure_self_or_admin, order_service::OrderService, AppState},
    store::OrderFilter,
};

fn service(state: &AppState) -> OrderService {
    OrderService::new(state.store.clone())
}

fn views(orders: Vec<crate::models::order::Order>) -> Vec<OrderView> {
    orders.into_iter().map(Into::into).collect()
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    AppJson(req): AppJson<CreateOrderRequest>,
) -> AppResult<impl IntoResponse> {
    let order = service(&state).create_order(&claims.sub, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Order created successfully",
            "order": OrderView::from(order),
        })),
    ))
}

/// GET /api/orders (admin)
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> AppResult<impl IntoResponse> {
    let filter = OrderFilter {
        status: query.status,
        payment_status: query.payment_status,
    };
    let orders = views(service(&state).list_orders(&filter).await?);
    Ok(Json(json!({
        "success": true,
        "count": orders.len(),
        "orders": orders,
    })))
}

/// POST /api/orders/complete (admin)
pub async fn complete_order(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CompleteOrderRequest>,
) -> AppResult<impl IntoResponse> {
    let order = service(&state)
        .complete_order(&req.order_id, &req.payment_details)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Order completed successfully",
        "order": OrderView::from(order),
    })))
}

/// GET /api/orders/user/{userId}
pub async fn user_orders(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    ensure_self_or_admin(&claims, &user_id)?;
    let orders = views(service(&state).list_user_orders(&user_id).await?);
    Ok(Json(json!({
        "success": true,
        "count": orders.len(),
        "orders": orders,
    })))
}

/// GET /api/orders/{orderId}
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(order_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let order = service(&state).get_order(&order_id).await?;
    ensure_self_or_admin(&claims, &order.user_id)?;
    Ok(Json(json!({ "success": true, "order": OrderView::from(order) })))
}

/// GET /api/orders/user/{userId}/courses
pub async fn purchased_courses(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    ensure_self_or_admin(&claims, &user_id)?;
    let courses = service(&state).purchased_courses(&user_id).await?;
    Ok(Json(json!({
        "success": true,
        "count": courses.len(),
        "courses": courses,
    })))
}

/// GET /api/orders/user/{userId}/course/{courseId}
pub async fn has_purchased(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((user_id, course_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    ensure_self_or_admin(&claims, &user_id)?;
    let purchased = service(&state).has_purchased(&user_id, &course_id).await?;
    Ok(Json(json!({ "success": true, "hasPurchased": purchased })))
}

/// POST /api/orders/{orderId}/failed
pub async fn mark_failed(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(order_id): Path<String>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    // The body is optional; an empty POST fails without a reason.
    let req: FailOrderRequest = if body.is_empty() {
        FailOrderRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::validation(format!("Failed to parse JSON request body: {}", e)))?
    };

    let orders = service(&state);
    let order = orders.get_order(&order_id).await?;
    ensure_self_or_admin(&claims, &order.user_id)?;

    let order = orders.mark_failed(&order_id, req.reason.as_deref()).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Order marked as failed",
        "order": OrderView::from(order),
    })))
}
