use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::common::{message_response, success_response, validate_input, validate_positive_amount};
use crate::{
    auth::{AuthRouterExt, AuthUser, ADMIN_ROLE},
    errors::ServiceError,
    services::payments::{PaymentConfirmation, RefundInput},
    AppState,
};

pub fn payment_routes() -> Router<Arc<AppState>> {
    let customer = Router::new()
        .route("/create-intent", post(create_intent))
        .route("/confirm", post(confirm_payment))
        .route("/status/:order_id", get(payment_status))
        .with_auth();

    let admin = Router::new()
        .route("/refund", post(refund_payment))
        .with_role(ADMIN_ROLE);

    customer.merge(admin)
}

#[derive(Debug, Deserialize)]
pub struct CreateIntentBody {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentBody {
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "Gateway order id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundBody {
    pub order_id: Uuid,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Option<Decimal>,
    #[validate(length(max = 200, message = "Reason cannot exceed 200 characters"))]
    pub reason: Option<String>,
}

async fn create_intent(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateIntentBody>,
) -> Result<impl IntoResponse, ServiceError> {
    let intent = state
        .services
        .payments
        .create_intent(user.user_id, payload.order_id)
        .await?;
    Ok(success_response(intent))
}

async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ConfirmPaymentBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let confirmation = PaymentConfirmation {
        gateway_order_id: payload.razorpay_order_id,
        payment_id: payload.razorpay_payment_id,
        signature: payload.razorpay_signature,
    };
    let status = state
        .services
        .payments
        .confirm(user.user_id, confirmation)
        .await?;
    Ok(message_response(
        "Payment verified successfully",
        json!({ "order": status }),
    ))
}

async fn payment_status(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state
        .services
        .payments
        .status(user.user_id, order_id)
        .await?;
    Ok(success_response(status))
}

async fn refund_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RefundBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .payments
        .refund(RefundInput {
            order_id: payload.order_id,
            amount: payload.amount,
            reason: payload.reason,
        })
        .await?;
    Ok(message_response("Refund processed successfully", outcome))
}
