use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

use super::order_service::OrderService;
use super::ensure_self_or_admin;
use super::payment_gateway::{GatewayOrder, GatewayPayment, PaymentGateway};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middlewares::auth::JwtClaims;
use crate::models::order::GatewayPaymentDetails;
use crate::store::DocumentStore;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `"{gateway_order_id}|{gateway_payment_id}"`.
pub fn payment_signature(gateway_order_id: &str, gateway_payment_id: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a gateway callback signature.
pub fn verify_payment_signature(
    gateway_order_id: &str,
    gateway_payment_id: &str,
    provided_signature: &str,
    secret: &str,
) -> bool {
    let Ok(provided) = hex::decode(provided_signature.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Gateway callback. Field names follow the checkout widget.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub razorpay_order_id: Option<String>,
    #[serde(default)]
    pub razorpay_payment_id: Option<String>,
    #[serde(default)]
    pub razorpay_signature: Option<String>,
    /// Our own order id, when the checkout was started from an order.
    #[serde(default, rename = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerified {
    pub payment_id: String,
    pub order_id: String,
}

/// Payment status as shown to clients, amount in major units.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub created_at: Option<i64>,
}

impl From<GatewayPayment> for PaymentStatusView {
    fn from(p: GatewayPayment) -> Self {
        Self {
            id: p.id,
            amount: p.amount as f64 / 100.0,
            currency: p.currency,
            status: p.status,
            method: p.method,
            email: p.email,
            contact: p.contact,
            created_at: p.created_at,
        }
    }
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    orders: OrderService,
    secret: String,
}

impl PaymentService {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn DocumentStore>, secret: &str) -> Self {
        Self {
            gateway,
            orders: OrderService::new(store),
            secret: secret.to_string(),
        }
    }

    pub async fn create_gateway_order(&self, req: CreatePaymentRequest) -> AppResult<GatewayOrder> {
        if !req.amount.is_finite() || req.amount <= 0.0 {
            return Err(AppError::validation("Invalid amount provided"));
        }
        let currency = req.currency.unwrap_or_else(|| "INR".to_string());
        let amount_minor = (req.amount * 100.0).round() as u64;
        let receipt = format!("receipt_{}", Utc::now().timestamp_millis());

        self.gateway
            .create_order(amount_minor, &currency, &receipt)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gateway order creation failed");
                AppError::Upstream(e.to_string())
            })
    }

    /// A valid signature completes the referenced order; an invalid one
    /// fails it. Exactly one of the two ever runs, and only for the order's
    /// owner or an admin.
    pub async fn verify(
        &self,
        claims: &JwtClaims,
        req: VerifyPaymentRequest,
    ) -> AppResult<PaymentVerified> {
        let (Some(gateway_order_id), Some(payment_id), Some(signature)) = (
            req.razorpay_order_id.filter(|s| !s.is_empty()),
            req.razorpay_payment_id.filter(|s| !s.is_empty()),
            req.razorpay_signature.filter(|s| !s.is_empty()),
        ) else {
            return Err(AppError::validation("Missing payment verification details"));
        };
        let order_id = req.order_id.filter(|s| !s.is_empty());
        if let Some(order_id) = &order_id {
            let order = self.orders.get_order(order_id).await?;
            ensure_self_or_admin(claims, &order.user_id)?;
        }

        if !verify_payment_signature(&gateway_order_id, &payment_id, &signature, &self.secret) {
            metrics::record_payment_verification("invalid");
            tracing::warn!(
                gateway_order_id = %gateway_order_id,
                order_id = ?order_id,
                "Payment signature mismatch"
            );
            if let Some(order_id) = &order_id {
                if let Err(e) = self
                    .orders
                    .mark_failed(order_id, Some("Payment verification failed - invalid signature"))
                    .await
                {
                    tracing::error!(order_id = %order_id, error = %e, "Could not mark order as failed");
                }
            }
            return Err(AppError::IntegrityFailure(
                "Payment verification failed - invalid signature".to_string(),
            ));
        }

        metrics::record_payment_verification("valid");
        if let Some(order_id) = &order_id {
            let details = GatewayPaymentDetails {
                razorpay_order_id: Some(gateway_order_id.clone()),
                razorpay_payment_id: Some(payment_id.clone()),
                razorpay_signature: Some(signature),
                transaction_id: None,
            };
            self.orders.complete_order(order_id, &details).await?;
        }

        Ok(PaymentVerified {
            payment_id,
            order_id: gateway_order_id,
        })
    }

    pub async fn payment_status(&self, payment_id: &str) -> AppResult<PaymentStatusView> {
        self.gateway
            .fetch_payment(payment_id)
            .await
            .map(Into::into)
            .map_err(|e| {
                tracing::error!(payment_id = %payment_id, error = %e, "Gateway payment lookup failed");
                AppError::Upstream(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        // echo -n "order_1|pay_1" | openssl dgst -sha256 -hmac secret
        let expected = {
            let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
            mac.update(b"order_1|pay_1");
            hex::encode(mac.finalize().into_bytes())
        };
        assert_eq!(payment_signature("order_1", "pay_1", "secret"), expected);
        assert_eq!(expected.len(), 64);
    }

    #[test]
    fn verifies_own_signature() {
        let sig = payment_signature("order_1", "pay_1", "secret");
        assert!(verify_payment_signature("order_1", "pay_1", &sig, "secret"));
    }

    #[test]
    fn rejects_tampered_inputs() {
        let sig = payment_signature("order_1", "pay_1", "secret");
        assert!(!verify_payment_signature("order_1", "pay_2", &sig, "secret"));
        assert!(!verify_payment_signature("order_1", "pay_1", &sig, "other-secret"));
        assert!(!verify_payment_signature("order_1", "pay_1", "not-hex", "secret"));
        assert!(!verify_payment_signature("order_1", "pay_1", &sig[..62], "secret"));
    }

    #[test]
    fn status_view_converts_minor_units() {
        let view = PaymentStatusView::from(GatewayPayment {
            id: "pay_1".into(),
            amount: 49_950,
            currency: "INR".into(),
            status: "captured".into(),
            method: Some("upi".into()),
            order_id: None,
            email: None,
            contact: None,
            created_at: None,
        });
        assert_eq!(view.amount, 499.5);
    }
}
