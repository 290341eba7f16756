use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    DocumentStore, OrderFilter, StoreError, StoreResult, Transition, UserFilter, UserTypeBreakdown,
};
use crate::models::certificate::Certificate;
use crate::models::course::Course;
use crate::models::order::{GatewayPaymentDetails, Order, OrderStatus, PaymentStatus};
use crate::models::progress::Progress;
use crate::models::quiz::Quiz;
use crate::models::quiz_attempt::QuizAttempt;
use crate::models::user::{PurchasedCourse, User, UserStatus, UserType};

type PairKey = (String, String);

fn pair(a: &str, b: &str) -> PairKey {
    (a.to_string(), b.to_string())
}

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    courses: HashMap<String, Course>,
    orders: HashMap<String, Order>,
    progress: HashMap<PairKey, Progress>,
    quizzes: HashMap<String, Quiz>,
    attempts: Vec<QuizAttempt>,
    attempt_counters: HashMap<PairKey, u32>,
    certificates: HashMap<String, Certificate>,
}

/// Process-local `DocumentStore`. One lock guards all collections, so every
/// trait method is a single critical section and the atomic primitives hold
/// trivially. Unique keys mirror the Mongo indexes.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email".into()));
        }
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("username".into()));
        }
        if state.users.contains_key(&user.id) {
            return Err(StoreError::Duplicate("_id".into()));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    async fn update_account(&self, user: &User) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(slot) = state.users.get_mut(&user.id) else {
            return Ok(false);
        };
        slot.status = user.status;
        slot.login_attempts = user.login_attempts;
        slot.last_login = user.last_login;
        slot.is_verified = user.is_verified;
        slot.suspicious_activity = user.suspicious_activity.clone();
        slot.profile = user.profile.clone();
        slot.metadata = user.metadata.clone();
        Ok(true)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        skip: u64,
        limit: u64,
    ) -> StoreResult<(Vec<User>, u64)> {
        let state = self.state.read().await;
        let mut matching: Vec<User> = state
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        newest_first(&mut matching, |u| u.account_created);
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn grant_purchases(&self, user_id: &str, grants: &[PurchasedCourse]) -> StoreResult<u32> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(user_id) else {
            return Ok(0);
        };
        let mut added = 0;
        for grant in grants {
            if !user.has_purchased(&grant.course_id) {
                user.purchased_courses.push(grant.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    async fn delete_disposable_users_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.users.len();
        state
            .users
            .retain(|_, u| !(u.user_type.is_disposable() && u.account_created < cutoff));
        Ok((before - state.users.len()) as u64)
    }

    async fn user_breakdown(&self) -> StoreResult<Vec<UserTypeBreakdown>> {
        let state = self.state.read().await;
        let mut by_type: HashMap<UserType, UserTypeBreakdown> = HashMap::new();
        for user in state.users.values() {
            let entry = by_type.entry(user.user_type).or_insert(UserTypeBreakdown {
                user_type: user.user_type,
                count: 0,
                active_users: 0,
                flagged_users: 0,
            });
            entry.count += 1;
            match user.status {
                UserStatus::Active => entry.active_users += 1,
                UserStatus::Flagged => entry.flagged_users += 1,
                _ => {}
            }
        }
        let mut rows: Vec<UserTypeBreakdown> = by_type.into_values().collect();
        rows.sort_by(|a, b| a.user_type.as_str().cmp(b.user_type.as_str()));
        Ok(rows)
    }

    async fn count_users(&self) -> StoreResult<u64> {
        Ok(self.state.read().await.users.len() as u64)
    }

    async fn count_suspicious_users(&self, min_count: u32) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.suspicious_activity.count >= min_count)
            .count() as u64)
    }

    async fn insert_course(&self, course: &Course) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.courses.contains_key(&course.id) {
            return Err(StoreError::Duplicate("_id".into()));
        }
        state.courses.insert(course.id.clone(), course.clone());
        Ok(())
    }

    async fn find_course(&self, id: &str) -> StoreResult<Option<Course>> {
        Ok(self.state.read().await.courses.get(id).cloned())
    }

    async fn find_courses(&self, ids: &[String]) -> StoreResult<Vec<Course>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.courses.get(id).cloned())
            .collect())
    }

    async fn list_courses(&self) -> StoreResult<Vec<Course>> {
        let state = self.state.read().await;
        let mut courses: Vec<Course> = state.courses.values().cloned().collect();
        newest_first(&mut courses, |c| c.created_at);
        Ok(courses)
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.order_id) {
            return Err(StoreError::Duplicate("orderId".into()));
        }
        state.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn find_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.state.read().await.orders.get(order_id).cloned())
    }

    async fn complete_order(
        &self,
        order_id: &str,
        details: &GatewayPaymentDetails,
        now: DateTime<Utc>,
    ) -> StoreResult<Transition> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(order_id) else {
            return Ok(Transition::Missing);
        };
        if !order.status.is_open() {
            return Ok(Transition::Unchanged(order.clone()));
        }
        order.payment.status = PaymentStatus::Completed;
        order.payment.paid_at = Some(now);
        if details.razorpay_order_id.is_some() {
            order.payment.razorpay_order_id = details.razorpay_order_id.clone();
        }
        if details.razorpay_payment_id.is_some() {
            order.payment.razorpay_payment_id = details.razorpay_payment_id.clone();
        }
        if details.razorpay_signature.is_some() {
            order.payment.razorpay_signature = details.razorpay_signature.clone();
        }
        if details.transaction_id.is_some() {
            order.payment.transaction_id = details.transaction_id.clone();
        }
        order.status = OrderStatus::Completed;
        order.completed_at = Some(now);
        Ok(Transition::Applied(order.clone()))
    }

    async fn fail_order(&self, order_id: &str, reason: Option<&str>) -> StoreResult<Transition> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(order_id) else {
            return Ok(Transition::Missing);
        };
        if !order.status.is_open() {
            return Ok(Transition::Unchanged(order.clone()));
        }
        order.payment.status = PaymentStatus::Failed;
        order.status = OrderStatus::Cancelled;
        if let Some(reason) = reason {
            order.notes = Some(reason.to_string());
        }
        Ok(Transition::Applied(order.clone()))
    }

    async fn list_user_orders(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut orders, |o| o.order_date);
        Ok(orders)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        newest_first(&mut orders, |o| o.order_date);
        Ok(orders)
    }

    async fn find_progress(&self, user_id: &str, course_id: &str) -> StoreResult<Option<Progress>> {
        let state = self.state.read().await;
        Ok(state.progress.get(&pair(user_id, course_id)).cloned())
    }

    async fn ensure_progress(&self, fresh: &Progress) -> StoreResult<Progress> {
        let mut state = self.state.write().await;
        let record = state
            .progress
            .entry(pair(&fresh.user_id, &fresh.course_id))
            .or_insert_with(|| fresh.clone());
        Ok(record.clone())
    }

    async fn raise_watch_time(
        &self,
        user_id: &str,
        course_id: &str,
        lesson_id: &str,
        seconds: u64,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(progress) = state.progress.get_mut(&pair(user_id, course_id)) {
            progress.watch_time.raise(lesson_id, seconds);
        }
        Ok(())
    }

    async fn apply_lesson_progress(
        &self,
        user_id: &str,
        course_id: &str,
        lesson_id: &str,
        completed: bool,
        total_lessons: usize,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Progress>> {
        let mut state = self.state.write().await;
        Ok(state
            .progress
            .get_mut(&pair(user_id, course_id))
            .map(|progress| {
                progress.apply_lesson(lesson_id, completed, total_lessons, now);
                progress.clone()
            }))
    }

    async fn mark_certificate_issued(&self, user_id: &str, course_id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(progress) = state.progress.get_mut(&pair(user_id, course_id)) {
            progress.certificate_issued = true;
        }
        Ok(())
    }

    async fn insert_quiz(&self, quiz: &Quiz) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.quizzes.contains_key(&quiz.id) {
            return Err(StoreError::Duplicate("_id".into()));
        }
        state.quizzes.insert(quiz.id.clone(), quiz.clone());
        Ok(())
    }

    async fn find_quiz(&self, id: &str) -> StoreResult<Option<Quiz>> {
        Ok(self.state.read().await.quizzes.get(id).cloned())
    }

    async fn replace_quiz(&self, quiz: &Quiz) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        match state.quizzes.get_mut(&quiz.id) {
            Some(slot) => {
                *slot = quiz.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_quiz_published(&self, id: &str, published: bool) -> StoreResult<Option<Quiz>> {
        let mut state = self.state.write().await;
        Ok(state.quizzes.get_mut(id).map(|quiz| {
            quiz.is_published = published;
            quiz.updated_at = Utc::now();
            quiz.clone()
        }))
    }

    async fn delete_quiz(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.quizzes.remove(id).is_none() {
            return Ok(false);
        }
        state.attempts.retain(|a| a.quiz_id != id);
        state.attempt_counters.retain(|(quiz_id, _), _| quiz_id != id);
        Ok(true)
    }

    async fn list_quizzes(&self) -> StoreResult<Vec<Quiz>> {
        let state = self.state.read().await;
        let mut quizzes: Vec<Quiz> = state.quizzes.values().cloned().collect();
        newest_first(&mut quizzes, |q| q.created_at);
        Ok(quizzes)
    }

    async fn list_course_quizzes(&self, course_id: &str, viewer_id: &str) -> StoreResult<Vec<Quiz>> {
        let state = self.state.read().await;
        let mut quizzes: Vec<Quiz> = state
            .quizzes
            .values()
            .filter(|q| q.course_id == course_id && (q.is_published || q.created_by == viewer_id))
            .cloned()
            .collect();
        quizzes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(quizzes)
    }

    async fn count_attempts(&self, quiz_id: &str, user_id: &str) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.quiz_id == quiz_id && a.user_id == user_id)
            .count() as u64)
    }

    async fn count_quiz_attempts(&self, quiz_id: &str) -> StoreResult<u64> {
        let state = self.state.read().await;
        Ok(state.attempts.iter().filter(|a| a.quiz_id == quiz_id).count() as u64)
    }

    async fn next_attempt_number(&self, quiz_id: &str, user_id: &str) -> StoreResult<u32> {
        let mut state = self.state.write().await;
        let counter = state.attempt_counters.entry(pair(quiz_id, user_id)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.attempts.iter().any(|a| {
            a.quiz_id == attempt.quiz_id
                && a.user_id == attempt.user_id
                && a.attempt_number == attempt.attempt_number
        }) {
            return Err(StoreError::Duplicate("quizId_userId_attemptNumber".into()));
        }
        state.attempts.push(attempt.clone());
        Ok(())
    }

    async fn list_quiz_attempts(&self, quiz_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        let state = self.state.read().await;
        let mut attempts: Vec<QuizAttempt> = state
            .attempts
            .iter()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect();
        newest_first(&mut attempts, |a| a.submitted_at);
        Ok(attempts)
    }

    async fn list_user_attempts(&self, user_id: &str, course_id: &str) -> StoreResult<Vec<QuizAttempt>> {
        let state = self.state.read().await;
        let mut attempts: Vec<QuizAttempt> = state
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.course_id == course_id)
            .cloned()
            .collect();
        newest_first(&mut attempts, |a| a.submitted_at);
        Ok(attempts)
    }

    async fn insert_certificate(&self, certificate: &Certificate) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.certificates.values().any(|c| {
            c.user_id == certificate.user_id && c.course_id == certificate.course_id
        }) {
            return Err(StoreError::Duplicate("userId_courseId".into()));
        }
        if state
            .certificates
            .values()
            .any(|c| c.certificate_number == certificate.certificate_number)
        {
            return Err(StoreError::Duplicate("certificateNumber".into()));
        }
        state
            .certificates
            .insert(certificate.id.clone(), certificate.clone());
        Ok(())
    }

    async fn find_certificate(&self, id: &str) -> StoreResult<Option<Certificate>> {
        Ok(self.state.read().await.certificates.get(id).cloned())
    }

    async fn find_certificate_for(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> StoreResult<Option<Certificate>> {
        let state = self.state.read().await;
        Ok(state
            .certificates
            .values()
            .find(|c| c.user_id == user_id && c.course_id == course_id)
            .cloned())
    }

    async fn find_certificate_by_number(&self, number: &str) -> StoreResult<Option<Certificate>> {
        let state = self.state.read().await;
        Ok(state
            .certificates
            .values()
            .find(|c| c.certificate_number == number)
            .cloned())
    }

    async fn list_user_certificates(&self, user_id: &str) -> StoreResult<Vec<Certificate>> {
        let state = self.state.read().await;
        let mut certificates: Vec<Certificate> = state
            .certificates
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut certificates, |c| c.issue_date);
        Ok(certificates)
    }

    async fn list_certificates(&self) -> StoreResult<Vec<Certificate>> {
        let state = self.state.read().await;
        let mut certificates: Vec<Certificate> = state.certificates.values().cloned().collect();
        newest_first(&mut certificates, |c| c.issue_date);
        Ok(certificates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn attempt_counter_never_repeats_under_concurrency() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.next_attempt_number("quiz", "user").await.unwrap()
            }));
        }
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=32).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn watch_time_only_rises() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.ensure_progress(&Progress::new("u", "c", now)).await.unwrap();
        for seconds in [10, 5, 20, 15] {
            store.raise_watch_time("u", "c", "l1", seconds).await.unwrap();
        }
        let progress = store.find_progress("u", "c").await.unwrap().unwrap();
        assert_eq!(progress.watch_time.get("l1"), 20);
    }

    #[tokio::test]
    async fn ensure_progress_keeps_existing_record() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.ensure_progress(&Progress::new("u", "c", now)).await.unwrap();
        let second = store.ensure_progress(&Progress::new("u", "c", now)).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn grants_are_deduplicated() {
        let store = MemoryStore::new();
        let user = User::new("u".into(), "u@example.com".into(), "h".into(), UserType::Regular);
        store.insert_user(&user).await.unwrap();
        let grant = PurchasedCourse {
            course_id: "c1".into(),
            purchased_at: Utc::now(),
            order_id: "ORD-1".into(),
        };
        assert_eq!(store.grant_purchases(&user.id, &[grant.clone()]).await.unwrap(), 1);
        assert_eq!(store.grant_purchases(&user.id, &[grant]).await.unwrap(), 0);
        let stored = store.find_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.purchased_courses.len(), 1);
    }

    #[tokio::test]
    async fn account_update_keeps_concurrent_grant() {
        let store = MemoryStore::new();
        let user = User::new("u".into(), "u@example.com".into(), "h".into(), UserType::Regular);
        store.insert_user(&user).await.unwrap();

        // read before the grant lands, written back after it
        let stale = store.find_user(&user.id).await.unwrap().unwrap();
        let grant = PurchasedCourse {
            course_id: "c1".into(),
            purchased_at: Utc::now(),
            order_id: "ORD-1".into(),
        };
        store.grant_purchases(&user.id, &[grant]).await.unwrap();
        let failed = stale.apply_login_failure(Utc::now());
        assert!(store.update_account(&failed).await.unwrap());

        let stored = store.find_user(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.login_attempts, 1);
        assert!(stored.has_purchased("c1"));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        let a = User::new("a".into(), "same@example.com".into(), "h".into(), UserType::Regular);
        let b = User::new("b".into(), "same@example.com".into(), "h".into(), UserType::Regular);
        store.insert_user(&a).await.unwrap();
        assert!(matches!(
            store.insert_user(&b).await,
            Err(StoreError::Duplicate(key)) if key == "email"
        ));
    }
}
