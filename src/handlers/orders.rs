use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, message_response, success_response, validate_input, CheckoutDetails,
    PageParams, ShippingAddressInput,
};
use crate::{
    auth::{AuthRouterExt, AuthUser, ADMIN_ROLE},
    entities::order::{OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
    services::{checkout::CheckoutRequest, orders::AdminOrderFilter},
    AppState,
};

pub const USER_PAGE_SIZE: u64 = 10;
pub const ADMIN_PAGE_SIZE: u64 = 20;

/// Customer routes plus the `/admin` surface, each with its own guard.
pub fn order_routes() -> Router<Arc<AppState>> {
    let customer = Router::new()
        .route("/", get(list_orders))
        .route("/checkout", post(checkout))
        .route("/buy-now", post(buy_now))
        .route("/:id", get(get_order))
        .route("/:id/cancel", put(cancel_order))
        .with_auth();

    let admin = Router::new()
        .route("/all", get(admin_list_orders))
        .route("/:id/status", put(admin_update_status))
        .with_role(ADMIN_ROLE);

    customer.nest("/admin", admin)
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct BuyNowBody {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 10, message = "Quantity must be between 1 and 10"))]
    pub quantity: i32,
    #[validate]
    pub shipping_address: ShippingAddressInput,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

impl BuyNowBody {
    fn into_parts(self) -> (Uuid, i32, CheckoutRequest) {
        let details = CheckoutDetails {
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            notes: self.notes,
        };
        (self.product_id, self.quantity, details.into())
    }
}

impl From<CheckoutDetails> for CheckoutRequest {
    fn from(details: CheckoutDetails) -> Self {
        Self {
            shipping_address: details.shipping_address.into(),
            payment_method: details.payment_method,
            notes: details.notes.filter(|n| !n.trim().is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelOrderBody {
    #[validate(length(max = 200, message = "Reason cannot exceed 200 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdminOrderQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusBody {
    pub status: OrderStatus,
    #[validate(length(min = 1, max = 100, message = "Tracking number must be between 1 and 100 characters"))]
    pub tracking_number: Option<String>,
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = params.resolve(USER_PAGE_SIZE);
    let orders = state
        .services
        .orders
        .list_for_user(user.user_id, page, limit)
        .await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_for_user(user.user_id, order_id)
        .await?;
    Ok(success_response(json!({ "order": order })))
}

async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CheckoutDetails>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let order = state
        .services
        .checkout
        .checkout_cart(user.user_id, payload.into())
        .await?;
    Ok(created_response(
        "Order placed successfully",
        json!({ "order": order }),
    ))
}

async fn buy_now(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<BuyNowBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let (product_id, quantity, request) = payload.into_parts();
    let order = state
        .services
        .checkout
        .buy_now(user.user_id, product_id, quantity, request)
        .await?;
    Ok(created_response(
        "Order placed successfully",
        json!({ "order": order }),
    ))
}

/// The body is optional; without one the default reason is recorded.
async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
    payload: Option<Json<CancelOrderBody>>,
) -> Result<impl IntoResponse, ServiceError> {
    let body = payload.map(|Json(b)| b).unwrap_or_default();
    validate_input(&body)?;
    let order = state
        .services
        .orders
        .cancel_for_user(user.user_id, order_id, body.reason)
        .await?;
    Ok(message_response(
        "Order cancelled successfully",
        json!({ "order": order }),
    ))
}

async fn admin_list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminOrderQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = PageParams {
        page: query.page,
        limit: query.limit,
    }
    .resolve(ADMIN_PAGE_SIZE);
    let filter = AdminOrderFilter {
        status: query.status,
        payment_status: query.payment_status,
    };
    let orders = state.services.orders.admin_list(filter, page, limit).await?;
    Ok(success_response(orders))
}

/// Administrative override: sets any status without lifecycle checks.
async fn admin_update_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let order = state
        .services
        .orders
        .update_status(order_id, payload.status, payload.tracking_number)
        .await?;
    Ok(message_response(
        "Order status updated successfully",
        json!({ "order": order }),
    ))
}
