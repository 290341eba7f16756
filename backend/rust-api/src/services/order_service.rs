use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use validator::Validate;

use super::load_user;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::new_id;
use crate::models::order::{
    CreateOrderRequest, GatewayPaymentDetails, Order, OrderLineItem, OrderStatus, PaymentInfo,
    PaymentStatus, PurchasedCourseEntry,
};
use crate::models::user::PurchasedCourse;
use crate::store::{DocumentStore, OrderFilter, StoreError, Transition};
use crate::utils::retry::{retry_async_with_config_if, RetryConfig};

const ORDER_ID_ATTEMPTS: usize = 3;

/// `ORD-{unix millis}-{9 uppercase alphanumerics}`
pub fn generate_order_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", now.timestamp_millis(), suffix)
}

pub struct OrderService {
    store: Arc<dyn DocumentStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create_order(&self, user_id: &str, req: CreateOrderRequest) -> AppResult<Order> {
        req.validate()?;
        load_user(self.store.as_ref(), user_id).await?;

        let mut seen = HashSet::new();
        let course_ids: Vec<String> = req.courses.iter().map(|c| c.course_id.clone()).collect();
        if let Some(dup) = course_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(AppError::validation(format!(
                "Course {} appears more than once in the order",
                dup
            )));
        }

        let courses: HashMap<String, _> = self
            .store
            .find_courses(&course_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        let line_items = course_ids
            .iter()
            .map(|id| {
                courses.get(id).map(|course| OrderLineItem {
                    course_id: course.id.clone(),
                    title: course.title.clone(),
                    price: course.effective_price(),
                    thumbnail: course.thumbnail.clone(),
                })
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AppError::not_found("One or more courses not found"))?;

        let template = Order {
            id: new_id(),
            order_id: String::new(),
            user_id: user_id.to_string(),
            courses: line_items,
            billing_info: req.billing_info,
            payment: PaymentInfo {
                method: req.payment.method,
                status: PaymentStatus::Pending,
                razorpay_order_id: None,
                razorpay_payment_id: None,
                razorpay_signature: None,
                transaction_id: None,
                paid_at: None,
            },
            pricing: req.pricing,
            status: OrderStatus::Pending,
            order_date: Utc::now(),
            completed_at: None,
            notes: None,
        };

        // The unique index on orderId is the real guarantee; a collision
        // just draws a new suffix.
        let order = retry_async_with_config_if(
            RetryConfig::immediate(ORDER_ID_ATTEMPTS),
            || {
                let mut order = template.clone();
                order.order_id = generate_order_id(Utc::now());
                async move { self.store.insert_order(&order).await.map(|_| order) }
            },
            |e| matches!(e, StoreError::Duplicate(_)),
        )
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => AppError::conflict("Could not allocate a unique order id"),
            other => other.into(),
        })?;

        metrics::record_order("pending");
        tracing::info!(order_id = %order.order_id, user_id = %user_id, "Order created");
        Ok(order)
    }

    /// Marks the order paid and credits its courses to the buyer.
    ///
    /// Re-completing a completed order is a success that only re-runs the
    /// credit step, which never adds a course twice. That makes a partial
    /// failure between the two writes recoverable by calling this again.
    pub async fn complete_order(
        &self,
        order_id: &str,
        details: &GatewayPaymentDetails,
    ) -> AppResult<Order> {
        let now = Utc::now();
        let order = match self.store.complete_order(order_id, details, now).await? {
            Transition::Applied(order) => {
                metrics::record_order("completed");
                tracing::info!(order_id = %order_id, user_id = %order.user_id, "Order completed");
                order
            }
            Transition::Unchanged(order) if order.status == OrderStatus::Completed => {
                tracing::info!(order_id = %order_id, "Order already completed, re-checking purchases");
                order
            }
            Transition::Unchanged(order) => {
                return Err(AppError::conflict(format!(
                    "Order is {} and cannot be completed",
                    order.status.as_str()
                )))
            }
            Transition::Missing => return Err(AppError::not_found("Order not found")),
        };

        let added = self.grant_courses(&order, now).await?;
        if added > 0 {
            tracing::info!(order_id = %order_id, added, "Courses credited to user");
        }
        Ok(order)
    }

    async fn grant_courses(&self, order: &Order, now: DateTime<Utc>) -> AppResult<u32> {
        let grants: Vec<PurchasedCourse> = order
            .course_ids()
            .map(|course_id| PurchasedCourse {
                course_id: course_id.to_string(),
                purchased_at: now,
                order_id: order.order_id.clone(),
            })
            .collect();

        retry_async_with_config_if(
            RetryConfig::default(),
            || self.store.grant_purchases(&order.user_id, &grants),
            |e| matches!(e, StoreError::Backend(_)),
        )
        .await
        .map_err(|e| {
            tracing::error!(
                order_id = %order.order_id,
                error = %e,
                "Order completed but crediting courses failed; retry completion to recover"
            );
            AppError::from(e)
        })
    }

    pub async fn mark_failed(&self, order_id: &str, reason: Option<&str>) -> AppResult<Order> {
        match self.store.fail_order(order_id, reason).await? {
            Transition::Applied(order) => {
                metrics::record_order("cancelled");
                tracing::warn!(order_id = %order_id, reason = ?reason, "Order marked as failed");
                Ok(order)
            }
            Transition::Unchanged(order) if order.status == OrderStatus::Cancelled => Ok(order),
            Transition::Unchanged(order) => Err(AppError::conflict(format!(
                "Order is {} and cannot be marked as failed",
                order.status.as_str()
            ))),
            Transition::Missing => Err(AppError::not_found("Order not found")),
        }
    }

    pub async fn get_order(&self, order_id: &str) -> AppResult<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order not found"))
    }

    pub async fn list_user_orders(&self, user_id: &str) -> AppResult<Vec<Order>> {
        Ok(self.store.list_user_orders(user_id).await?)
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> AppResult<Vec<Order>> {
        Ok(self.store.list_orders(filter).await?)
    }

    pub async fn purchased_courses(&self, user_id: &str) -> AppResult<Vec<PurchasedCourseEntry>> {
        let user = load_user(self.store.as_ref(), user_id).await?;
        let ids: Vec<String> = user.purchased_courses.iter().map(|p| p.course_id.clone()).collect();
        let mut courses: HashMap<String, _> = self
            .store
            .find_courses(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        Ok(user
            .purchased_courses
            .into_iter()
            .map(|p| PurchasedCourseEntry {
                course: courses.remove(&p.course_id).map(Into::into),
                course_id: p.course_id,
                purchased_at: p.purchased_at,
                order_id: p.order_id,
            })
            .collect())
    }

    /// False for unknown users rather than an error.
    pub async fn has_purchased(&self, user_id: &str, course_id: &str) -> AppResult<bool> {
        Ok(self
            .store
            .find_user(user_id)
            .await?
            .is_some_and(|u| u.has_purchased(course_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_id_format() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let id = generate_order_id(now);
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], "1700000000000");
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn order_ids_differ() {
        let now = Utc::now();
        assert_ne!(generate_order_id(now), generate_order_id(now));
    }
}
