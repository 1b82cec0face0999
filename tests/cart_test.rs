//! Cart endpoints: adding, updating, removing, clearing and stock checks.

mod common;

use axum::http::Method;
use common::{decimal, response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use shopfront_api::entities::cart;

#[tokio::test]
async fn empty_cart_is_created_on_first_read() {
    let app = TestApp::new().await;

    let response = app.as_customer(Method::GET, "/api/cart", None).await;
    assert_eq!(response.status(), 200);

    let body = response_json(response).await;
    let cart = &body["data"]["cart"];
    assert_eq!(cart["items"].as_array().map(Vec::len), Some(0));
    assert_eq!(cart["total_items"], 0);
    assert_eq!(decimal(&cart["total_amount"]), dec!(0));
}

#[tokio::test]
async fn simultaneous_first_requests_share_one_cart() {
    let app = TestApp::new().await;
    let product = app.seed_product("Desk Fan", dec!(40), 10).await;

    let (read, add) = tokio::join!(
        app.as_customer(Method::GET, "/api/cart", None),
        app.add_to_cart(&app.customer_token, product.id, 2)
    );
    assert_eq!(read.status(), 200);
    assert_eq!(add.status(), 200);

    let carts = cart::Entity::find()
        .filter(cart::Column::UserId.eq(app.customer.id))
        .count(&*app.state.db)
        .await
        .expect("count carts");
    assert_eq!(carts, 1);

    let body = response_json(app.as_customer(Method::GET, "/api/cart", None).await).await;
    assert_eq!(body["data"]["cart"]["total_items"], 2);
}

#[tokio::test]
async fn adding_twice_merges_into_one_line() {
    let app = TestApp::new().await;
    let product = app.seed_product_with("Headphones", dec!(200), Some(dec!(150)), 10).await;

    let first = app.add_to_cart(&app.customer_token, product.id, 2).await;
    assert_eq!(first.status(), 200);
    let body = response_json(first).await;
    assert_eq!(body["message"], "Item added to cart successfully");

    let second = app.add_to_cart(&app.customer_token, product.id, 3).await;
    let body = response_json(second).await;
    let cart = &body["data"]["cart"];
    let items = cart["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
    // Lines are captured at the discount price.
    assert_eq!(decimal(&items[0]["price"]), dec!(150));
    assert_eq!(cart["total_items"], 5);
    assert_eq!(decimal(&cart["total_amount"]), dec!(750));
}

#[tokio::test]
async fn adding_more_than_stock_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Smart Watch", dec!(300), 3).await;

    let response = app.add_to_cart(&app.customer_token, product.id, 4).await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Only 3 items available in stock");

    assert_eq!(app.add_to_cart(&app.customer_token, product.id, 2).await.status(), 200);
    let response = app.add_to_cart(&app.customer_token, product.id, 2).await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(
        body["message"],
        "Cannot add 2 items. Only 1 more items available"
    );
}

#[tokio::test]
async fn inactive_product_cannot_be_added() {
    let app = TestApp::new().await;
    let product = app.seed_product("Old Speaker", dec!(100), 5).await;
    app.set_product_active(product.id, false).await;

    let response = app.add_to_cart(&app.customer_token, product.id, 1).await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Product not found or unavailable");
}

#[tokio::test]
async fn quantity_outside_line_limits_fails_validation() {
    let app = TestApp::new().await;
    let product = app.seed_product("Keyboard", dec!(80), 50).await;

    let response = app.add_to_cart(&app.customer_token, product.id, 11).await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["errors"][0]["field"], "quantity");
}

#[tokio::test]
async fn update_to_zero_removes_the_line() {
    let app = TestApp::new().await;
    let mouse = app.seed_product("Mouse", dec!(40), 10).await;
    let pad = app.seed_product("Mouse Pad", dec!(10), 10).await;
    app.add_to_cart(&app.customer_token, mouse.id, 2).await;
    app.add_to_cart(&app.customer_token, pad.id, 1).await;

    let response = app
        .as_customer(
            Method::PUT,
            "/api/cart/update",
            Some(json!({ "product_id": mouse.id, "quantity": 4 })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(decimal(&body["data"]["cart"]["total_amount"]), dec!(170));

    let response = app
        .as_customer(
            Method::PUT,
            "/api/cart/update",
            Some(json!({ "product_id": mouse.id, "quantity": 0 })),
        )
        .await;
    let body = response_json(response).await;
    let items = body["data"]["cart"]["items"].as_array().expect("items").clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Mouse Pad");
}

#[tokio::test]
async fn updating_a_missing_line_is_not_found() {
    let app = TestApp::new().await;
    let product = app.seed_product("Monitor", dec!(900), 2).await;
    app.as_customer(Method::GET, "/api/cart", None).await;

    let response = app
        .as_customer(
            Method::PUT,
            "/api/cart/update",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), 404);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Item not found in cart");
}

#[tokio::test]
async fn remove_and_clear() {
    let app = TestApp::new().await;
    let a = app.seed_product("Cable", dec!(15), 10).await;
    let b = app.seed_product("Charger", dec!(45), 10).await;
    app.add_to_cart(&app.customer_token, a.id, 1).await;
    app.add_to_cart(&app.customer_token, b.id, 1).await;

    let response = app
        .as_customer(Method::DELETE, &format!("/api/cart/remove/{}", a.id), None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["cart"]["total_items"], 1);

    let response = app.as_customer(Method::DELETE, "/api/cart/clear", None).await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Cart cleared successfully");
    assert_eq!(body["data"]["cart"]["total_items"], 0);
}

#[tokio::test]
async fn deactivated_products_drop_out_of_the_cart() {
    let app = TestApp::new().await;
    let kept = app.seed_product("Tripod", dec!(60), 10).await;
    let gone = app.seed_product("Lens Cap", dec!(5), 10).await;
    app.add_to_cart(&app.customer_token, kept.id, 1).await;
    app.add_to_cart(&app.customer_token, gone.id, 1).await;

    app.set_product_active(gone.id, false).await;

    let body = response_json(app.as_customer(Method::GET, "/api/cart", None).await).await;
    let items = body["data"]["cart"]["items"].as_array().expect("items").clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Tripod");
}

#[tokio::test]
async fn cart_requires_a_token() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/cart", None, None).await;
    assert_eq!(response.status(), 401);
    let body = response_json(response).await;
    assert_eq!(body["message"], "No token, authorization denied");
}
