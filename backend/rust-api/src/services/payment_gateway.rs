use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::PaymentSettings;

/// An order registered with the payment processor. Amounts are in minor
/// currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    pub amount: u64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn create_order(&self, amount_minor: u64, currency: &str, receipt: &str) -> Result<GatewayOrder>;
    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment>;
}

/// Razorpay REST client (basic auth with the key pair).
pub struct RazorpayGateway {
    client: reqwest::Client,
    settings: PaymentSettings,
}

impl RazorpayGateway {
    pub fn new(settings: PaymentSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build payment HTTP client")?;
        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.api_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, amount_minor: u64, currency: &str, receipt: &str) -> Result<GatewayOrder> {
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
        });

        let response = self
            .client
            .post(self.url("orders"))
            .basic_auth(&self.settings.key_id, Some(&self.settings.key_secret))
            .json(&body)
            .send()
            .await
            .context("Failed to call payment gateway")?;

        if !response.status().is_success() {
            anyhow::bail!("Payment gateway returned status: {}", response.status());
        }

        response
            .json::<GatewayOrder>()
            .await
            .context("Invalid payment gateway order response")
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment> {
        let response = self
            .client
            .get(self.url(&format!("payments/{}", payment_id)))
            .basic_auth(&self.settings.key_id, Some(&self.settings.key_secret))
            .send()
            .await
            .context("Failed to call payment gateway")?;

        if !response.status().is_success() {
            anyhow::bail!("Payment gateway returned status: {}", response.status());
        }

        response
            .json::<GatewayPayment>()
            .await
            .context("Invalid payment gateway payment response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_without_double_slash() {
        let gateway = RazorpayGateway::new(PaymentSettings {
            key_id: "k".into(),
            key_secret: "s".into(),
            api_url: "https://api.example.test/v1/".into(),
        })
        .unwrap();
        assert_eq!(gateway.url("orders"), "https://api.example.test/v1/orders");
    }

    #[test]
    fn parses_payment_payload() {
        let payment: GatewayPayment = serde_json::from_value(serde_json::json!({
            "id": "pay_29QQoUBi66xm2f",
            "entity": "payment",
            "amount": 50000,
            "currency": "INR",
            "status": "captured",
            "method": "card",
            "order_id": "order_9A33XWu170gUtm",
            "created_at": 1_700_000_000
        }))
        .unwrap();
        assert_eq!(payment.amount, 50000);
        assert_eq!(payment.order_id.as_deref(), Some("order_9A33XWu170gUtm"));
    }
}
