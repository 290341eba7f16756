use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;

use crate::error::AppError;
use crate::middlewares::rate_limit::extract_client_ip_from;
use crate::services::auth_service::ClientInfo;

/// JSON extractor whose rejections use the API error envelope instead of
/// axum's plain-text bodies.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let message = format!("Failed to parse JSON request body: {}", rejection.body_text());
                tracing::warn!("{}", message);
                Err(AppError::Validation(message).into_response())
            }
        }
    }
}

/// Client address and user agent, for login bookkeeping.
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = extract_client_ip_from(&parts.headers, &parts.extensions);
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientInfo {
            ip_address: (ip != "unknown").then_some(ip),
            user_agent,
        })
    }
}
