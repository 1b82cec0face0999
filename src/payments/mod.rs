//! Payment gateway boundary.
//!
//! The checkout core never talks to a gateway directly; [`crate::services::payments`] drives a
//! [`PaymentGateway`] built once at startup and injected through application state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::info;

use crate::{config::AppConfig, errors::ServiceError};

pub mod razorpay;

pub use razorpay::{payment_signature, RazorpayGateway};

/// Gateway-side order (Razorpay "order", Stripe "payment intent").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayOrderRequest {
    /// Amount in the currency's minor unit.
    pub amount: i64,
    pub currency: String,
    /// Our order id, echoed back by the gateway.
    pub receipt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefundRequest {
    /// Partial refund in minor units; `None` refunds the full captured amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key handed to clients so they can open the hosted checkout.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, ServiceError>;

    /// Checks the signature the client received after paying `gateway_order_id`.
    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool;

    async fn refund(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<GatewayRefund, ServiceError>;
}

/// Builds the configured gateway, or `None` when no Razorpay keys are set.
pub fn gateway_from_config(cfg: &AppConfig) -> Result<Option<Arc<dyn PaymentGateway>>, ServiceError> {
    let Some((key_id, key_secret)) = cfg.razorpay_credentials() else {
        info!("Razorpay keys not configured; payment endpoints disabled");
        return Ok(None);
    };
    let gateway = RazorpayGateway::new(cfg.razorpay_base_url.clone(), key_id, key_secret)?;
    info!(base_url = %cfg.razorpay_base_url, "Razorpay gateway enabled");
    Ok(Some(Arc::new(gateway)))
}
