use anyhow::Context;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

use super::{ensure_self_or_admin, load_user};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::user::{
    detect_suspicious_signals, ListUsersQuery, LoginRequest, Profile, RegisterRequest,
    UpdateStatusRequest, User, UserProfile, UserStatus, UserType,
};
use crate::store::{DocumentStore, StoreError, UserFilter, UserTypeBreakdown};

/// Disposable accounts older than this are removed by the cleanup endpoint.
const DISPOSABLE_USER_MAX_AGE_HOURS: i64 = 24;
/// Suspicious-activity count reported as "suspicious" in analytics.
const SUSPICIOUS_REPORT_THRESHOLD: u32 = 3;
const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Where a login or registration came from.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<UserProfile>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnalytics {
    pub user_breakdown: Vec<UserTypeBreakdown>,
    pub suspicious_users: u64,
    pub total_users: u64,
}

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    Ok(bcrypt::hash(password, cost).context("Failed to hash password")?)
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    Ok(bcrypt::verify(password, hash).context("Failed to verify password")?)
}

pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    jwt: JwtService,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(store: Arc<dyn DocumentStore>, jwt: JwtService, bcrypt_cost: u32) -> Self {
        Self {
            store,
            jwt,
            bcrypt_cost,
        }
    }

    fn respond(&self, user: User) -> AppResult<AuthResponse> {
        let token = self.jwt.issue(&user)?;
        Ok(AuthResponse {
            token,
            user: user.into(),
        })
    }

    pub async fn register(&self, req: RegisterRequest, client: ClientInfo) -> AppResult<AuthResponse> {
        req.validate()?;

        let user_type = req.user_type.unwrap_or_default();
        if user_type == UserType::Admin {
            return Err(AppError::access_denied("Admin accounts cannot be self-registered"));
        }

        let email = req.email.trim().to_lowercase();
        let username = req.username.trim().to_string();
        if let Some(existing) = self
            .store
            .find_user_by_email_or_username(&email, &username)
            .await?
        {
            return Err(if existing.email == email {
                AppError::conflict("User with this email already exists")
            } else {
                AppError::conflict("Username is already taken")
            });
        }

        let password_hash = hash_password(&req.password, self.bcrypt_cost)?;
        let now = Utc::now();
        let mut user = User::new(username, email, password_hash, user_type);
        if let Some(profile) = req.profile {
            user.profile.merge(profile);
        }
        user.metadata.ip_address = client.ip_address;
        user.metadata.user_agent = client.user_agent;

        let signals = detect_suspicious_signals(&user.email, user.metadata.user_agent.as_deref());
        if !signals.is_empty() {
            tracing::warn!(email = %user.email, reasons = ?signals, "Registration flagged as suspicious");
            user.suspicious_activity.count = signals.len() as u32;
            user.suspicious_activity.reasons = signals;
            user.suspicious_activity.last_activity = Some(now);
            user.status = UserStatus::Flagged;
        }

        self.store.insert_user(&user).await.map_err(|e| match e {
            StoreError::Duplicate(key) if key == "email" => {
                AppError::conflict("User with this email already exists")
            }
            StoreError::Duplicate(_) => AppError::conflict("Username is already taken"),
            other => other.into(),
        })?;

        tracing::info!(user_id = %user.id, user_type = user.user_type.as_str(), "User registered");
        self.respond(user)
    }

    pub async fn login(&self, req: LoginRequest, client: ClientInfo) -> AppResult<AuthResponse> {
        req.validate()?;

        let email = req.email.trim().to_lowercase();
        let Some(user) = self.store.find_user_by_email(&email).await? else {
            metrics::record_login("unknown_user");
            tracing::warn!(email = %email, "Login for unknown email");
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        };

        match user.status {
            UserStatus::Suspended => {
                metrics::record_login("blocked");
                return Err(AppError::access_denied("Account is suspended"));
            }
            UserStatus::Flagged => {
                metrics::record_login("blocked");
                return Err(AppError::access_denied(
                    "Account is flagged for suspicious activity",
                ));
            }
            UserStatus::Active | UserStatus::Inactive => {}
        }

        let now = Utc::now();
        if !verify_password(&req.password, &user.password_hash)? {
            let user = user.apply_login_failure(now);
            self.store.update_account(&user).await?;
            metrics::record_login("failure");
            tracing::warn!(
                user_id = %user.id,
                login_attempts = user.login_attempts,
                status = user.status.as_str(),
                "Failed login"
            );
            return Err(AppError::Unauthorized("Invalid credentials".to_string()));
        }

        let user = user.apply_login_success(now, client.ip_address, client.user_agent);
        self.store.update_account(&user).await?;
        metrics::record_login("success");
        tracing::info!(user_id = %user.id, "User logged in");

        self.respond(user)
    }

    pub async fn me(&self, user_id: &str) -> AppResult<UserProfile> {
        Ok(load_user(self.store.as_ref(), user_id).await?.into())
    }

    pub async fn update_profile(&self, user_id: &str, profile: Profile) -> AppResult<UserProfile> {
        profile.validate()?;
        let mut user = load_user(self.store.as_ref(), user_id).await?;
        user.profile.merge(profile);
        if !self.store.update_account(&user).await? {
            return Err(AppError::not_found("User not found"));
        }
        Ok(user.into())
    }

    pub async fn get_user(&self, claims: &JwtClaims, user_id: &str) -> AppResult<UserProfile> {
        ensure_self_or_admin(claims, user_id)?;
        Ok(load_user(self.store.as_ref(), user_id).await?.into())
    }

    pub async fn list_users(&self, query: ListUsersQuery) -> AppResult<UserPage> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let filter = UserFilter {
            user_type: query.user_type,
            status: query.status,
        };

        let (users, total) = self
            .store
            .list_users(&filter, (page - 1) * limit, limit)
            .await?;

        Ok(UserPage {
            users: users.into_iter().map(Into::into).collect(),
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(limit),
            },
        })
    }

    pub async fn update_status(&self, user_id: &str, req: UpdateStatusRequest) -> AppResult<UserProfile> {
        let user = load_user(self.store.as_ref(), user_id)
            .await?
            .apply_status_change(req.status, req.reason, Utc::now());
        if !self.store.update_account(&user).await? {
            return Err(AppError::not_found("User not found"));
        }
        tracing::info!(user_id = %user_id, status = user.status.as_str(), "User status updated");
        Ok(user.into())
    }

    pub async fn cleanup_test_users(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - Duration::hours(DISPOSABLE_USER_MAX_AGE_HOURS);
        let deleted = self.store.delete_disposable_users_before(cutoff).await?;
        tracing::info!(deleted, "Disposable users cleaned up");
        Ok(deleted)
    }

    pub async fn analytics(&self) -> AppResult<UserAnalytics> {
        Ok(UserAnalytics {
            user_breakdown: self.store.user_breakdown().await?,
            suspicious_users: self
                .store
                .count_suspicious_users(SUSPICIOUS_REPORT_THRESHOLD)
                .await?,
            total_users: self.store.count_users().await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse", 4).unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }
}
