// Payment gateway flow: gateway orders, signature verification, status lookup
use axum::http::StatusCode;
use coursehub_api::models::user::UserType;
use coursehub_api::store::DocumentStore;
use serde_json::json;

mod common;

use common::{create_test_app, order_payload};

#[tokio::test]
async fn create_gateway_order_converts_to_minor_units() {
    let app = create_test_app();
    let (_, token) = app.create_user("buyer", UserType::Regular).await;

    let (status, body) = app
        .post("/api/payment/create-order", &token, json!({ "amount": 499.5 }))
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["amount"], 49_950);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["orderId"], "order_stub_49950");
}

#[tokio::test]
async fn create_gateway_order_rejects_non_positive_amount() {
    let app = create_test_app();
    let (_, token) = app.create_user("buyer", UserType::Regular).await;

    for amount in [0.0, -10.0] {
        let (status, body) = app
            .post("/api/payment/create-order", &token, json!({ "amount": amount }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid amount provided");
    }
}

#[tokio::test]
async fn valid_signature_completes_order() {
    let app = create_test_app();
    let (user, token) = app.create_user("buyer", UserType::Regular).await;
    let course = app.create_course("rust-basics", 2).await;

    let (_, body) = app
        .post("/api/orders", &token, order_payload(&[&course.id]))
        .await;
    let order_id = body["order"]["orderId"].as_str().unwrap().to_string();

    let signature = app.sign("order_abc", "pay_xyz");
    let (status, body) = app
        .post(
            "/api/payment/verify",
            &token,
            json!({
                "razorpay_order_id": "order_abc",
                "razorpay_payment_id": "pay_xyz",
                "razorpay_signature": signature,
                "orderId": order_id,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["paymentId"], "pay_xyz");

    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status.as_str(), "completed");
    assert_eq!(order.payment.razorpay_payment_id.as_deref(), Some("pay_xyz"));

    let stored = app.store.find_user(&user.id).await.unwrap().unwrap();
    assert!(stored.has_purchased(&course.id));
}

#[tokio::test]
async fn invalid_signature_fails_order_and_grants_nothing() {
    let app = create_test_app();
    let (user, token) = app.create_user("buyer", UserType::Regular).await;
    let course = app.create_course("rust-basics", 2).await;

    let (_, body) = app
        .post("/api/orders", &token, order_payload(&[&course.id]))
        .await;
    let order_id = body["order"]["orderId"].as_str().unwrap().to_string();

    let forged = app.sign("order_abc", "pay_other");
    let (status, body) = app
        .post(
            "/api/payment/verify",
            &token,
            json!({
                "razorpay_order_id": "order_abc",
                "razorpay_payment_id": "pay_xyz",
                "razorpay_signature": forged,
                "orderId": order_id,
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status.as_str(), "cancelled");
    assert_eq!(order.payment.status.as_str(), "failed");

    let stored = app.store.find_user(&user.id).await.unwrap().unwrap();
    assert!(!stored.has_purchased(&course.id));
}

#[tokio::test]
async fn verify_rejects_another_users_order() {
    let app = create_test_app();
    let (_, owner_token) = app.create_user("buyer", UserType::Regular).await;
    let (_, other_token) = app.create_user("stranger", UserType::Regular).await;
    let course = app.create_course("rust-basics", 2).await;

    let (_, body) = app
        .post("/api/orders", &owner_token, order_payload(&[&course.id]))
        .await;
    let order_id = body["order"]["orderId"].as_str().unwrap().to_string();

    // neither a bad nor a good signature lets a stranger touch the order
    for signature in ["00".repeat(32), app.sign("order_abc", "pay_xyz")] {
        let (status, body) = app
            .post(
                "/api/payment/verify",
                &other_token,
                json!({
                    "razorpay_order_id": "order_abc",
                    "razorpay_payment_id": "pay_xyz",
                    "razorpay_signature": signature,
                    "orderId": order_id,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
    }

    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status.as_str(), "pending");
    assert_eq!(order.payment.status.as_str(), "pending");

    let (status, _) = app
        .post(
            "/api/payment/verify",
            &other_token,
            json!({
                "razorpay_order_id": "order_abc",
                "razorpay_payment_id": "pay_xyz",
                "razorpay_signature": app.sign("order_abc", "pay_xyz"),
                "orderId": "ORD-missing",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verify_requires_all_gateway_fields() {
    let app = create_test_app();
    let (_, token) = app.create_user("buyer", UserType::Regular).await;

    let (status, body) = app
        .post(
            "/api/payment/verify",
            &token,
            json!({ "razorpay_order_id": "order_abc" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing payment verification details");
}

#[tokio::test]
async fn payment_status_reports_major_units() {
    let app = create_test_app();
    let (_, token) = app.create_user("buyer", UserType::Regular).await;

    let (status, body) = app.get("/api/payment/status/pay_123", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["amount"], 499.0);
    assert_eq!(body["payment"]["status"], "captured");

    let (status, _) = app.get("/api/payment/status/pay_missing", &token).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}
