//! Payment gateway client.
//!
//! The gateway is consumed as an opaque service: order creation returns an
//! order id, and signature verification is delegated to the gateway's own
//! endpoint — the HMAC is never computed in-process.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Base URL of the gateway REST API
    pub api_url: String,
    pub key_id: String,
    pub key_secret: String,
}

// ─────────────────────────────────────────────────────────
// Gateway request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OrderRequest<'a> {
    /// Amount in currency minor units (e.g. paise)
    amount: i64,
    currency: &'a str,
    receipt: Option<&'a str>,
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    order_id: &'a str,
    payment_id: &'a str,
    signature: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    valid: bool,
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PaymentClient {
    client: Client,
    settings: Option<PaymentSettings>,
}

impl PaymentClient {
    pub fn new(client: Client, settings: Option<PaymentSettings>) -> Self {
        Self { client, settings }
    }

    fn settings(&self) -> Result<&PaymentSettings> {
        self.settings
            .as_ref()
            .ok_or_else(|| AppError::Config("payment gateway is not configured".to_string()))
    }

    /// Create an order with the gateway. Returns the gateway order id.
    pub async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: Option<&str>,
    ) -> Result<String> {
        let settings = self.settings()?;
        let response = self
            .client
            .post(format!("{}/orders", settings.api_url))
            .basic_auth(&settings.key_id, Some(&settings.key_secret))
            .json(&OrderRequest {
                amount: amount_minor,
                currency,
                receipt,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Payment(format!(
                "order creation failed with status {}",
                response.status()
            )));
        }

        let body: OrderResponse = response.json().await?;
        Ok(body.id)
    }

    /// Check a payment signature's authenticity with the gateway.
    pub async fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool> {
        let settings = self.settings()?;
        let response = self
            .client
            .post(format!("{}/payments/verify", settings.api_url))
            .basic_auth(&settings.key_id, Some(&settings.key_secret))
            .json(&VerifyRequest {
                order_id,
                payment_id,
                signature,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Payment(format!(
                "signature verification failed with status {}",
                response.status()
            )));
        }

        let body: VerifyResponse = response.json().await?;
        Ok(body.valid)
    }
}
