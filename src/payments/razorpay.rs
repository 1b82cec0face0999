use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::{GatewayOrder, GatewayOrderRequest, GatewayRefund, PaymentGateway, RefundRequest};
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

fn signature_mac(key_secret: &str, gateway_order_id: &str, payment_id: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes()).ok()?;
    mac.update(format!("{gateway_order_id}|{payment_id}").as_bytes());
    Some(mac)
}

/// Lowercase hex HMAC-SHA256 of `"{order_id}|{payment_id}"`, the value Razorpay hands the client
/// after a successful payment.
pub fn payment_signature(key_secret: &str, gateway_order_id: &str, payment_id: &str) -> Option<String> {
    signature_mac(key_secret, gateway_order_id, payment_id)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Razorpay REST client (orders, refunds) authenticated with the key id/secret pair.
#[derive(Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayGateway {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ServiceError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, %url, "razorpay request failed");
                ServiceError::ExternalServiceError(format!("razorpay unreachable: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                ServiceError::ExternalServiceError(format!("invalid razorpay response: {e}"))
            });
        }

        let detail = response
            .json::<RazorpayErrorBody>()
            .await
            .ok()
            .map(|b| b.error);
        let description = detail
            .as_ref()
            .and_then(|d| d.description.clone())
            .unwrap_or_else(|| status.to_string());
        warn!(
            status = status.as_u16(),
            code = detail.as_ref().and_then(|d| d.code.as_deref()).unwrap_or(""),
            %description,
            "razorpay rejected request"
        );

        if status.is_client_error() {
            Err(ServiceError::PaymentFailed(description))
        } else {
            Err(ServiceError::ExternalServiceError(description))
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    #[instrument(skip(self), fields(receipt = %request.receipt))]
    async fn create_order(&self, request: &GatewayOrderRequest) -> Result<GatewayOrder, ServiceError> {
        let body = serde_json::json!({
            "amount": request.amount,
            "currency": request.currency,
            "receipt": request.receipt,
            "payment_capture": 1,
        });
        let order: GatewayOrder = self.post("/v1/orders", &body).await?;
        info!(gateway_order_id = %order.id, amount = order.amount, "razorpay order created");
        Ok(order)
    }

    fn verify_signature(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        signature_mac(&self.key_secret, gateway_order_id, payment_id)
            .map(|mac| mac.verify_slice(&provided).is_ok())
            .unwrap_or(false)
    }

    #[instrument(skip(self, request))]
    async fn refund(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<GatewayRefund, ServiceError> {
        let path = format!("/v1/payments/{payment_id}/refund");
        let refund: GatewayRefund = self.post(&path, request).await?;
        info!(refund_id = %refund.id, "razorpay refund created");
        Ok(refund)
    }
}
