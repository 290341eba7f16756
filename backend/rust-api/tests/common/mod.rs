#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use coursehub_api::{
    config::Config,
    create_router,
    models::course::{Course, CourseLevel, Lesson, Topic, VideoProvider},
    models::user::{PurchasedCourse, User, UserType},
    services::{
        auth_service::hash_password,
        payment_gateway::{GatewayOrder, GatewayPayment, PaymentGateway},
        payment_service::payment_signature,
        AppState,
    },
    store::{DocumentStore, MemoryStore},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "password123";

/// Gateway double: hands out predictable ids and never touches the network.
pub struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(
        &self,
        amount_minor: u64,
        currency: &str,
        receipt: &str,
    ) -> anyhow::Result<GatewayOrder> {
        Ok(GatewayOrder {
            id: format!("order_stub_{}", amount_minor),
            amount: amount_minor,
            currency: currency.to_string(),
            receipt: Some(receipt.to_string()),
            status: Some("created".to_string()),
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> anyhow::Result<GatewayPayment> {
        if payment_id == "pay_missing" {
            anyhow::bail!("Payment gateway returned status: 400 Bad Request");
        }
        Ok(GatewayPayment {
            id: payment_id.to_string(),
            amount: 49_900,
            currency: "INR".to_string(),
            status: "captured".to_string(),
            method: Some("card".to_string()),
            order_id: Some("order_stub_49900".to_string()),
            email: Some("buyer@example.com".to_string()),
            contact: None,
            created_at: Some(1_700_000_000),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub state: Arc<AppState>,
}

pub fn test_config() -> Config {
    Config {
        bcrypt_cost: 4,
        jwt_secret: "integration-test-secret".to_string(),
        ..Config::default()
    }
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store = Arc::new(MemoryStore::new());
    let state = Arc::new(AppState::new(
        test_config(),
        store.clone(),
        Arc::new(StubGateway),
    ));

    TestApp {
        router: create_router(state.clone()),
        store,
        state,
    }
}

impl TestApp {
    /// Inserts a user directly and returns it with a valid bearer token.
    pub async fn create_user(&self, username: &str, user_type: UserType) -> (User, String) {
        let user = User::new(
            username.to_string(),
            format!("{}@example.com", username),
            hash_password(PASSWORD, 4).unwrap(),
            user_type,
        );
        self.store.insert_user(&user).await.unwrap();
        let token = self.state.jwt.issue(&user).unwrap();
        (user, token)
    }

    /// A course with one topic holding `lessons` lessons named `l1..ln`.
    pub async fn create_course(&self, title: &str, lessons: usize) -> Course {
        let now = Utc::now();
        let course = Course {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: format!("{} description", title),
            short_description: String::new(),
            category: "programming".to_string(),
            level: CourseLevel::Beginner,
            language: "English".to_string(),
            thumbnail: format!("https://cdn.example.com/{}.png", title),
            price: 499.0,
            discount_price: Some(299.0),
            is_free: false,
            has_discount: true,
            curriculum: vec![Topic {
                id: "t1".to_string(),
                title: "Basics".to_string(),
                lessons: (1..=lessons)
                    .map(|n| Lesson {
                        id: format!("l{}", n),
                        title: format!("Lesson {}", n),
                        description: String::new(),
                        video_url: None,
                        video_provider: VideoProvider::None,
                        video_id: None,
                        duration: Some("10:00".to_string()),
                        duration_seconds: Some(600),
                        is_free: false,
                        order: n as u32,
                        resources: Vec::new(),
                    })
                    .collect(),
            }],
            instructor: "Ferris Crab".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_course(&course).await.unwrap();
        course
    }

    pub async fn grant_course(&self, user_id: &str, course_id: &str) {
        self.store
            .grant_purchases(
                user_id,
                &[PurchasedCourse {
                    course_id: course_id.to_string(),
                    purchased_at: Utc::now(),
                    order_id: "ORD-TEST".to_string(),
                }],
            )
            .await
            .unwrap();
    }

    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        payment_signature(
            gateway_order_id,
            gateway_payment_id,
            &self.state.config.payment.key_secret,
        )
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(token), Some(body)).await
    }
}

/// Minimal valid order payload for the given courses.
pub fn order_payload(course_ids: &[&str]) -> Value {
    serde_json::json!({
        "courses": course_ids.iter().map(|id| serde_json::json!({ "courseId": id })).collect::<Vec<_>>(),
        "billingInfo": {
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "phoneNumber": "+441234567890",
            "country": "UK",
            "state": "London",
            "city": "London",
            "zipCode": "N1 9GU"
        },
        "payment": { "method": "razorpay" },
        "pricing": { "subtotal": 299.0, "discount": 0.0, "total": 299.0, "currency": "INR" }
    })
}
