//! Persistence seam. Services talk to `Arc<dyn DocumentStore>`; MongoDB backs
//! production and the in-memory store backs tests and local runs.
//!
//! Every method that mutates a counter, a monotonic value or a lifecycle
//! state is a single atomic step in each backend, never read-modify-write
//! from the service layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::certificate::Certificate;
use crate::models::course::Course;
use crate::models::order::{GatewayPaymentDetails, Order, OrderStatus, PaymentStatus};
use crate::models::progress::Progress;
use crate::models::quiz::Quiz;
use crate::models::quiz_attempt::QuizAttempt;
use crate::models::user::{PurchasedCourse, User, UserStatus, UserType};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write; carries the offending key name.
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
    pub status: Option<UserStatus>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.user_type.map_or(true, |t| user.user_type == t)
            && self.status.map_or(true, |s| user.status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.payment_status.map_or(true, |s| order.payment.status == s)
    }
}

/// Per-userType account figures for the admin analytics view.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypeBreakdown {
    #[serde(rename = "_id")]
    pub user_type: UserType,
    pub count: u64,
    pub active_users: u64,
    pub flagged_users: u64,
}

/// Outcome of a guarded order transition.
#[derive(Debug, Clone)]
pub enum Transition {
    /// The order was open and this call moved it.
    Applied(Order),
    /// The order was already terminal; nothing was written.
    Unchanged(Order),
    Missing,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> StoreResult<()>;

    // Users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> StoreResult<Option<User>>;
    /// Writes the account fields a user's own activity changes: status,
    /// login counters and stamps, suspicious activity, profile, metadata and
    /// verification. `purchased_courses` is never written here; it only
    /// moves through `grant_purchases`. False when the user no longer exists.
    async fn update_account(&self, user: &User) -> StoreResult<bool>;
    /// Newest first, with the total count matching `filter`.
    async fn list_users(
        &self,
        filter: &UserFilter,
        skip: u64,
        limit: u64,
    ) -> StoreResult<(Vec<User>, u64)>;
    /// Appends each grant whose course is not yet purchased. Returns how
    /// many were appended.
    async fn grant_purchases(&self, user_id: &str, grants: &[PurchasedCourse]) -> StoreResult<u32>;
    async fn delete_disposable_users_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
    async fn user_breakdown(&self) -> StoreResult<Vec<UserTypeBreakdown>>;
    async fn count_users(&self) -> StoreResult<u64>;
    async fn count_suspicious_users(&self, min_count: u32) -> StoreResult<u64>;

    // Courses
    async fn insert_course(&self, course: &Course) -> StoreResult<()>;
    async fn find_course(&self, id: &str) -> StoreResult<Option<Course>>;
    async fn find_courses(&self, ids: &[String]) -> StoreResult<Vec<Course>>;
    async fn list_courses(&self) -> StoreResult<Vec<Course>>;

    // Orders
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;
    async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>>;
    /// Open order -> completed, recording gateway references.
    async fn complete_order(
        &self,
        order_id: &str,
        details: &GatewayPaymentDetails,
        now: DateTime<Utc>,
    ) -> StoreResult<Transition>;
    /// Open order -> cancelled with failed payment.
    async fn fail_order(&self, order_id: &str, reason: Option<&str>) -> StoreResult<Transition>;
    async fn list_user_orders(&self, user_id: &str) -> StoreResult<Vec<Order>>;
    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    // Progress
    async fn find_progress(&self, user_id: &str, course_id: &str) -> StoreResult<Option<Progress>>;
    /// Returns the existing record or inserts `fresh`.
    async fn ensure_progress(&self, fresh: &Progress) -> StoreResult<Progress>;
    /// Raises the lesson's watch time to `seconds` if that is larger.
    async fn raise_watch_time(
        &self,
        user_id: &str,
        course_id: &str,
        lesson_id: &str,
        seconds: u64,
    ) -> StoreResult<()>;
    /// Set-appends the lesson when `completed`, recomputes the percentage
    /// against `total_lessons`, stamps current lesson and access time.
    async fn apply_lesson_progress(
        &self,
        user_id: &str,
        course_id: &str,
        lesson_id: &str,
        completed: bool,
        total_lessons: usize,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Progress>>;
    async fn mark_certificate_issued(&self, user_id: &str, course_id: &str) -> StoreResult<()>;

    // Quizzes
    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()>;
    async fn find_quiz(&self, id: &str) -> StoreResult<Option<Quiz>>;
    async fn replace_quiz(&self, quiz: &Quiz) -> StoreResult<bool>;
    async fn set_quiz_published(&self, id: &str, published: bool) -> StoreResult<Option<Quiz>>;
    /// Removes the quiz with its attempts and attempt counters.
    async fn delete_quiz(&self, id: &str) -> StoreResult<bool>;
    async fn list_quizzes(&self) -> StoreResult<Vec<Quiz>>;
    /// Published quizzes of the course plus the viewer's own drafts.
    async fn list_course_quizzes(&self, course_id: &str, viewer_id: &str) -> StoreResult<Vec<Quiz>>;

    // Attempts
    async fn count_attempts(&self, quiz_id: &str, user_id: &str) -> StoreResult<u64>;
    async fn count_quiz_attempts(&self, quiz_id: &str) -> StoreResult<u64>;
    /// Atomically increments and returns the (quiz, user) attempt counter.
    async fn next_attempt_number(&self, quiz_id: &str, user_id: &str) -> StoreResult<u32>;
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> StoreResult<()>;
    async fn list_quiz_attempts(&self, quiz_id: &str) -> StoreResult<Vec<QuizAttempt>>;
    async fn list_user_attempts(&self, user_id: &str, course_id: &str) -> StoreResult<Vec<QuizAttempt>>;

    // Certificates
    async fn insert_certificate(&self, certificate: &Certificate) -> StoreResult<()>;
    async fn find_certificate(&self, id: &str) -> StoreResult<Option<Certificate>>;
    async fn find_certificate_for(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Certificate>>;
    async fn find_certificate_by_number(&self, number: &str) -> StoreResult<Option<Certificate>>;
    async fn list_user_certificates(&self, user_id: &str) -> StoreResult<Vec<Certificate>>;
    async fn list_certificates(&self) -> StoreResult<Vec<Certificate>>;
}
