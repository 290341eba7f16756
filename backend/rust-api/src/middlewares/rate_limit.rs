use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::AppError;
use crate::services::AppState;

const LOGIN_RATE_LIMIT: u32 = 10; // attempts per window
const LOGIN_RATE_WINDOW_SECONDS: u64 = 300;

// GET-then-INCR inside one script so concurrent requests cannot both pass
// the last free slot.
const RATE_LIMIT_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])

    local current = redis.call('GET', key)

    if current == false then
        redis.call('SET', key, 1, 'EX', window)
        return 1
    end

    current = tonumber(current)

    if current >= limit then
        return 0
    end

    redis.call('INCR', key)
    return 1
"#;

pub(crate) fn extract_client_ip_from(
    headers: &HeaderMap,
    extensions: &axum::http::Extensions,
) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(s) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        // comma separated list; the first hop is the client
        return s.split(',').next().unwrap_or(s).trim().to_string();
    }

    if let Some(s) = headers.get("forwarded").and_then(|v| v.to_str().ok()) {
        for part in s.split(';') {
            if let Some(val) = part.trim().strip_prefix("for=") {
                return val.trim().trim_matches('"').to_string();
            }
        }
    }

    if let Some(s) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return s.trim().to_string();
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

/// Throttles `POST /api/auth/login` per client IP. A pass-through when no
/// Redis connection is configured.
pub async fn login_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(request).await);
    };

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());

    let login_limit = std::env::var("RATE_LIMIT_LOGIN_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(LOGIN_RATE_LIMIT);

    let allowed = check_rate_limit(
        redis,
        &format!("ratelimit:login:{}", client_ip),
        login_limit,
        LOGIN_RATE_WINDOW_SECONDS,
    )
    .await
    .map_err(|e| {
        tracing::error!("Login rate limit check failed: {}", e);
        AppError::Internal(e)
    })?;

    if !allowed {
        tracing::warn!(client_ip = %client_ip, "Login rate limit exceeded");
        return Err(AppError::LimitExceeded(
            "Too many login attempts, please try again later".to_string(),
        ));
    }

    Ok(next.run(request).await)
}

async fn check_rate_limit(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let allowed: u32 = redis::Script::new(RATE_LIMIT_SCRIPT)
        .key(key)
        .arg(limit)
        .arg(window_seconds)
        .invoke_async(&mut conn)
        .await?;

    Ok(allowed == 1)
}
