use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::error::AppError;
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::User;
use crate::store::DocumentStore;

pub mod auth_service;
pub mod certificate_service;
pub mod grading;
pub mod order_service;
pub mod payment_gateway;
pub mod payment_service;
pub mod progress_service;
pub mod quiz_service;
pub mod seed;

use payment_gateway::PaymentGateway;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    /// Only used for login throttling; absent means no throttling.
    pub redis: Option<ConnectionManager>,
    pub jwt: JwtService,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        let jwt = JwtService::new(&config.jwt_secret, config.token_ttl_seconds);
        Self {
            config,
            store,
            redis: None,
            jwt,
            gateway,
        }
    }

    pub fn with_redis(mut self, redis: ConnectionManager) -> Self {
        self.redis = Some(redis);
        self
    }

    pub async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
        tracing::info!("Attempting to connect to Redis...");

        let client = redis::Client::open(uri)?;
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");
        Ok(redis)
    }
}

/// Loads the acting user; a token for a deleted account is a 404.
pub(crate) async fn load_user(store: &dyn DocumentStore, user_id: &str) -> Result<User, AppError> {
    store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))
}

/// Per-user resources are readable by their owner and by admins.
pub(crate) fn ensure_self_or_admin(claims: &JwtClaims, user_id: &str) -> Result<(), AppError> {
    if claims.is_admin() || claims.sub == user_id {
        Ok(())
    } else {
        Err(AppError::access_denied("Access denied"))
    }
}

/// Admins see everything; everyone else needs the course in their purchases.
pub(crate) fn ensure_course_access(user: &User, course_id: &str) -> Result<(), AppError> {
    if user.is_admin() || user.has_purchased(course_id) {
        Ok(())
    } else {
        Err(AppError::access_denied("Course not purchased"))
    }
}
