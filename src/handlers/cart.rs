use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::common::{message_response, success_response, validate_input};
use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    AppState,
};

pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart))
        .route("/add", post(add_to_cart))
        .route("/update", put(update_cart_item))
        .route("/remove/:product_id", delete(remove_from_cart))
        .route("/clear", delete(clear_cart))
        .with_auth()
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 10, message = "Quantity must be between 1 and 10"))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 0, max = 10, message = "Quantity must be between 0 and 10"))]
    pub quantity: i32,
}

async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.get_cart(user.user_id).await?;
    Ok(success_response(json!({ "cart": cart })))
}

async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .cart
        .add_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(message_response(
        "Item added to cart successfully",
        json!({ "cart": cart }),
    ))
}

/// Quantity 0 removes the line.
async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<UpdateCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .cart
        .update_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(message_response("Cart updated successfully", json!({ "cart": cart })))
}

async fn remove_from_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .cart
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(message_response(
        "Item removed from cart successfully",
        json!({ "cart": cart }),
    ))
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.clear(user.user_id).await?;
    Ok(message_response("Cart cleared successfully", json!({ "cart": cart })))
}
