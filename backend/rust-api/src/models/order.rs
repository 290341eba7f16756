use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::course::CourseView;
use super::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

/// Order model stored in MongoDB "orders" collection.
///
/// Created `pending`; moves exactly once to `completed` (payment completed)
/// or `cancelled` (payment failed).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "_id")]
    pub id: String,
    pub order_id: String,
    pub user_id: String,
    pub courses: Vec<OrderLineItem>,
    pub billing_info: BillingInfo,
    pub payment: PaymentInfo,
    pub pricing: Pricing,
    pub status: OrderStatus,
    #[serde(with = "bson_datetime_as_chrono")]
    pub order_date: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Snapshot of a course at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    pub course_id: String,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub thumbnail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BillingInfo {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Invalid billing email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone_number: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Zip code is required"))]
    pub zip_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_payment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub razorpay_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[validate(range(min = 0.0, message = "Subtotal cannot be negative"))]
    pub subtotal: f64,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "Discount cannot be negative"))]
    pub discount: f64,
    #[validate(range(min = 0.0, message = "Total cannot be negative"))]
    pub total: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

pub fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Razorpay,
    Card,
    Paypal,
    Stripe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// States from which an order may still complete or fail.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }
}

/// Gateway references recorded when an order is paid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayPaymentDetails {
    #[serde(default, alias = "razorpay_order_id")]
    pub razorpay_order_id: Option<String>,
    #[serde(default, alias = "razorpay_payment_id")]
    pub razorpay_payment_id: Option<String>,
    #[serde(default, alias = "razorpay_signature")]
    pub razorpay_signature: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl Order {
    pub fn course_ids(&self) -> impl Iterator<Item = &str> {
        self.courses.iter().map(|c| c.course_id.as_str())
    }
}

/// A purchase joined with the course it grants; `course` is absent when the
/// course has since been removed from the catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedCourseEntry {
    pub course_id: String,
    pub purchased_at: DateTime<Utc>,
    pub order_id: String,
    pub course: Option<CourseView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCourseRef {
    #[serde(alias = "_id")]
    pub course_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSelection {
    pub method: PaymentMethod,
}

/// Request DTO for creating an order
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "At least one course is required"))]
    pub courses: Vec<OrderCourseRef>,
    #[validate(nested)]
    pub billing_info: BillingInfo,
    pub payment: PaymentSelection,
    #[validate(nested)]
    pub pricing: Pricing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteOrderRequest {
    pub order_id: String,
    #[serde(default)]
    pub payment_details: GatewayPaymentDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailOrderRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

/// JSON view of an order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(rename = "_id")]
    pub id: String,
    pub order_id: String,
    pub user_id: String,
    pub courses: Vec<OrderLineItem>,
    pub billing_info: BillingInfo,
    pub payment: PaymentView,
    pub pricing: Pricing,
    pub status: OrderStatus,
    pub order_date: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_id: order.order_id,
            user_id: order.user_id,
            courses: order.courses,
            billing_info: order.billing_info,
            payment: PaymentView {
                method: order.payment.method,
                status: order.payment.status,
                razorpay_order_id: order.payment.razorpay_order_id,
                razorpay_payment_id: order.payment.razorpay_payment_id,
                transaction_id: order.payment.transaction_id,
                paid_at: order.payment.paid_at,
            },
            pricing: order.pricing,
            status: order.status,
            order_date: order.order_date,
            completed_at: order.completed_at,
            notes: order.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(courses: serde_json::Value) -> CreateOrderRequest {
        serde_json::from_value(serde_json::json!({
            "courses": courses,
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
            "pricing": { "subtotal": 10.0, "discount": 0.0, "total": 10.0 }
        }))
        .unwrap()
    }

    #[test]
    fn course_list_must_not_be_empty() {
        let req = request(serde_json::json!([{ "_id": "c1" }, { "courseId": "c2" }]));
        assert!(req.validate().is_ok());
        assert_eq!(req.courses[0].course_id, "c1");

        let err = request(serde_json::json!([])).validate().unwrap_err();
        assert!(err.field_errors().contains_key("courses"));
    }
}
