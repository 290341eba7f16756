use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// Failed logins after which every further failure counts as suspicious.
pub const LOGIN_ATTEMPTS_BEFORE_SUSPICION: u32 = 5;
/// Suspicious-activity count at which an account is flagged.
pub const SUSPICIOUS_FLAG_THRESHOLD: u32 = 5;

/// User model stored in MongoDB "users" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub user_type: UserType,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub login_attempts: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub account_created: DateTime<Utc>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub suspicious_activity: SuspiciousActivity,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub metadata: ClientMetadata,
    #[serde(default)]
    pub purchased_courses: Vec<PurchasedCourse>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Regular,
    Dummy,
    Test,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Regular => "regular",
            UserType::Dummy => "dummy",
            UserType::Test => "test",
            UserType::Admin => "admin",
        }
    }

    /// Dummy and test accounts are disposable and auto-verified.
    pub fn is_disposable(&self) -> bool {
        matches!(self, UserType::Dummy | UserType::Test)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
    Flagged,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
            UserStatus::Suspended => "suspended",
            UserStatus::Flagged => "flagged",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousActivity {
    #[serde(default)]
    pub count: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50))]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 50))]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 20))]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

impl Profile {
    /// Overlays the fields present in `update`, trimming text values.
    pub fn merge(&mut self, update: Profile) {
        fn pick(current: &mut Option<String>, incoming: Option<String>) {
            if let Some(value) = incoming {
                *current = Some(value.trim().to_string());
            }
        }
        pick(&mut self.first_name, update.first_name);
        pick(&mut self.last_name, update.last_name);
        pick(&mut self.phone_number, update.phone_number);
        pick(&mut self.avatar, update.avatar);
        pick(&mut self.bio, update.bio);
        pick(&mut self.gender, update.gender);
        pick(&mut self.date_of_birth, update.date_of_birth);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedCourse {
    pub course_id: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub purchased_at: DateTime<Utc>,
    pub order_id: String,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String, user_type: UserType) -> Self {
        Self {
            id: super::new_id(),
            username,
            email: email.trim().to_lowercase(),
            password_hash,
            user_type,
            status: UserStatus::Active,
            login_attempts: 0,
            last_login: None,
            account_created: Utc::now(),
            is_verified: user_type.is_disposable(),
            suspicious_activity: SuspiciousActivity::default(),
            profile: Profile::default(),
            metadata: ClientMetadata::default(),
            purchased_courses: Vec::new(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn has_purchased(&self, course_id: &str) -> bool {
        self.purchased_courses.iter().any(|p| p.course_id == course_id)
    }

    /// "First Last" when the profile carries a name, the username otherwise.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [&self.profile.first_name, &self.profile.last_name]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }

    /// Records one suspicious event; reaching the threshold flags the account.
    pub fn record_suspicious(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.suspicious_activity.count += 1;
        self.suspicious_activity.last_activity = Some(now);
        self.suspicious_activity.reasons.push(reason.into());
        if self.suspicious_activity.count >= SUSPICIOUS_FLAG_THRESHOLD {
            self.status = UserStatus::Flagged;
        }
    }

    /// State after a wrong password.
    pub fn apply_login_failure(mut self, now: DateTime<Utc>) -> Self {
        self.login_attempts += 1;
        if self.login_attempts >= LOGIN_ATTEMPTS_BEFORE_SUSPICION {
            self.record_suspicious("Multiple failed login attempts", now);
        }
        self
    }

    /// State after a successful login.
    pub fn apply_login_success(
        mut self,
        now: DateTime<Utc>,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.login_attempts = 0;
        self.last_login = Some(now);
        if ip_address.is_some() {
            self.metadata.ip_address = ip_address;
        }
        if user_agent.is_some() {
            self.metadata.user_agent = user_agent;
        }
        self
    }

    /// Administrative status change. Flagging with a reason records it as
    /// suspicious activity; leaving `flagged` clears the counter so the
    /// count threshold cannot immediately re-flag the account.
    pub fn apply_status_change(
        mut self,
        status: UserStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        self.status = status;
        match status {
            UserStatus::Flagged => {
                if let Some(reason) = reason {
                    self.record_suspicious(reason, now);
                }
            }
            _ => {
                if self.suspicious_activity.count >= SUSPICIOUS_FLAG_THRESHOLD {
                    self.suspicious_activity.count = 0;
                }
            }
        }
        self
    }
}

/// Signals checked at registration. Each match becomes one suspicious reason.
pub fn detect_suspicious_signals(email: &str, user_agent: Option<&str>) -> Vec<String> {
    const DISPOSABLE_MARKERS: [&str; 9] = [
        "10minutemail",
        "guerrillamail",
        "mailinator",
        "throwaway",
        "tempmail",
        "disposable",
        "fake",
        "test123",
        "spam",
    ];

    let mut reasons = Vec::new();
    let lowered = email.to_lowercase();

    if DISPOSABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
        reasons.push("Temporary/disposable email detected".to_string());
    }

    if let Some(agent) = user_agent {
        let agent = agent.to_lowercase();
        if ["bot", "crawler", "spider"].iter().any(|m| agent.contains(m)) {
            reasons.push("Bot-like user agent detected".to_string());
        }
    }

    if numbered_local_part(email) {
        reasons.push("Suspicious email pattern (random numbers)".to_string());
    }

    reasons
}

fn numbered_local_part(email: &str) -> bool {
    lazy_static::lazy_static! {
        static ref NUMBERED: regex::Regex = regex::Regex::new(r"^\w+\d{4,}@")
            .expect("static regex is valid");
    }
    NUMBERED.is_match(email)
}

/// Public view of a user (no credential material).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub user_type: UserType,
    pub status: UserStatus,
    pub is_verified: bool,
    pub profile: Profile,
    pub purchased_courses: Vec<PurchasedCourseView>,
    pub account_created: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub login_attempts: u32,
    pub suspicious_activity: SuspiciousActivityView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedCourseView {
    pub course_id: String,
    pub purchased_at: DateTime<Utc>,
    pub order_id: String,
}

impl From<&PurchasedCourse> for PurchasedCourseView {
    fn from(p: &PurchasedCourse) -> Self {
        Self {
            course_id: p.course_id.clone(),
            purchased_at: p.purchased_at,
            order_id: p.order_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousActivityView {
    pub count: u32,
    pub last_activity: Option<DateTime<Utc>>,
    pub reasons: Vec<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            purchased_courses: user.purchased_courses.iter().map(Into::into).collect(),
            id: user.id,
            username: user.username,
            email: user.email,
            user_type: user.user_type,
            status: user.status,
            is_verified: user.is_verified,
            profile: user.profile,
            account_created: user.account_created,
            last_login: user.last_login,
            login_attempts: user.login_attempts,
            suspicious_activity: SuspiciousActivityView {
                count: user.suspicious_activity.count,
                last_activity: user.suspicious_activity.last_activity,
                reasons: user.suspicious_activity.reasons,
            },
        }
    }
}

/// Request DTO for self-registration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30, message = "Username must be 3-30 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub user_type: Option<UserType>,
    #[serde(default)]
    #[validate(nested)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: UserStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub user_type: Option<UserType>,
    pub status: Option<UserStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(
            "learner".into(),
            "Learner@Example.com".into(),
            "hash".into(),
            UserType::Regular,
        )
    }

    #[test]
    fn email_is_normalised_and_regular_users_start_unverified() {
        let u = user();
        assert_eq!(u.email, "learner@example.com");
        assert!(!u.is_verified);
        assert!(User::new("d".into(), "d@x.io".into(), "h".into(), UserType::Dummy).is_verified);
    }

    #[test]
    fn login_failures_become_suspicious_after_five() {
        let now = Utc::now();
        let mut u = user();
        for _ in 0..4 {
            u = u.apply_login_failure(now);
        }
        assert_eq!(u.login_attempts, 4);
        assert_eq!(u.suspicious_activity.count, 0);

        u = u.apply_login_failure(now);
        assert_eq!(u.suspicious_activity.count, 1);
        assert_eq!(u.status, UserStatus::Active);
        assert_eq!(u.suspicious_activity.reasons, vec!["Multiple failed login attempts"]);
    }

    #[test]
    fn ninth_failure_flags_the_account() {
        let now = Utc::now();
        let mut u = user();
        for _ in 0..9 {
            u = u.apply_login_failure(now);
        }
        assert_eq!(u.suspicious_activity.count, 5);
        assert_eq!(u.status, UserStatus::Flagged);
    }

    #[test]
    fn login_success_resets_attempts() {
        let now = Utc::now();
        let u = user()
            .apply_login_failure(now)
            .apply_login_failure(now)
            .apply_login_success(now, Some("10.0.0.1".into()), None);
        assert_eq!(u.login_attempts, 0);
        assert_eq!(u.last_login, Some(now));
        assert_eq!(u.metadata.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn unflagging_keeps_count_below_threshold() {
        let now = Utc::now();
        let mut u = user();
        for _ in 0..5 {
            u.record_suspicious("manual", now);
        }
        assert_eq!(u.status, UserStatus::Flagged);

        let u = u.apply_status_change(UserStatus::Active, None, now);
        assert_eq!(u.status, UserStatus::Active);
        assert!(u.suspicious_activity.count < SUSPICIOUS_FLAG_THRESHOLD);
    }

    #[test]
    fn flagging_with_reason_records_it() {
        let u = user().apply_status_change(UserStatus::Flagged, Some("chargeback".into()), Utc::now());
        assert_eq!(u.status, UserStatus::Flagged);
        assert_eq!(u.suspicious_activity.count, 1);
        assert_eq!(u.suspicious_activity.reasons, vec!["chargeback"]);
    }

    #[test]
    fn detects_registration_signals() {
        assert!(detect_suspicious_signals("alice@example.com", Some("Mozilla/5.0")).is_empty());
        assert_eq!(
            detect_suspicious_signals("bob@mailinator.com", None),
            vec!["Temporary/disposable email detected"]
        );
        assert_eq!(detect_suspicious_signals("carol98765@example.com", Some("Googlebot")).len(), 2);
    }

    #[test]
    fn display_name_prefers_profile() {
        let mut u = user();
        assert_eq!(u.display_name(), "learner");
        u.profile.first_name = Some("Ada".into());
        u.profile.last_name = Some("Lovelace".into());
        assert_eq!(u.display_name(), "Ada Lovelace");
    }
}
