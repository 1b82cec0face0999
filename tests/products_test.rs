mod common;

use axum::http::Method;
use common::{decimal, response_json, uuid_of, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn listing_searches_filters_and_sorts() {
    let app = TestApp::new().await;
    app.seed_product("Wireless Mouse", dec!(30), 10).await;
    app.seed_product("Wired Mouse", dec!(12), 10).await;
    app.seed_product("Mechanical Keyboard", dec!(110), 10).await;
    let hidden = app.seed_product("Mouse Prototype", dec!(5), 10).await;
    app.set_product_active(hidden.id, false).await;

    let body = response_json(
        app.request(
            Method::GET,
            "/api/products?search=mouse&sort_by=price&sort_order=asc",
            None,
            None,
        )
        .await,
    )
    .await;
    let names: Vec<&str> = body["data"]["products"]
        .as_array()
        .expect("products")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Wired Mouse", "Wireless Mouse"]);
    assert_eq!(body["data"]["pagination"]["total"], 2);

    let body = response_json(
        app.request(Method::GET, "/api/products?min_price=20&max_price=200", None, None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["products"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn product_view_carries_derived_fields() {
    let app = TestApp::new().await;
    let product = app.seed_product_with("Running Shoes", dec!(3000), Some(dec!(2499)), 4).await;

    let response = app
        .request(Method::GET, &format!("/api/products/{}", product.id), None, None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    let view = &body["data"]["product"];
    assert_eq!(decimal(&view["effective_price"]), dec!(2499));
    assert_eq!(view["stock_status"], "Low Stock");
}

#[tokio::test]
async fn inactive_products_are_hidden_from_the_storefront() {
    let app = TestApp::new().await;
    let product = app.seed_product("Retired Gadget", dec!(10), 10).await;
    app.set_product_active(product.id, false).await;

    let response = app
        .request(Method::GET, &format!("/api/products/{}", product.id), None, None)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn categories_are_distinct() {
    let app = TestApp::new().await;
    app.seed_product("Phone", dec!(10000), 3).await;
    app.seed_product("Tablet", dec!(20000), 3).await;

    let body = response_json(app.request(Method::GET, "/api/products/categories", None, None).await).await;
    assert_eq!(body["data"]["categories"], json!(["Electronics"]));

    let body = response_json(
        app.request(Method::GET, "/api/products/category/Electronics", None, None)
            .await,
    )
    .await;
    assert_eq!(body["data"]["pagination"]["total"], 2);
}

#[tokio::test]
async fn admin_manages_the_catalog() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(
            Method::POST,
            "/api/products",
            Some(json!({
                "name": "Espresso Machine",
                "description": "15 bar pump",
                "price": "12000",
                "discount_price": "10999",
                "stock": 8,
                "category": "Kitchen"
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let created = &body["data"]["product"];
    let id = uuid_of(&created["id"]);
    assert!(created["image_url"].as_str().is_some_and(|u| !u.is_empty()));

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/products/{id}"),
            Some(json!({ "stock": 2 })),
        )
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(app.stock_of(id).await, 2);

    let response = app
        .as_admin(Method::DELETE, &format!("/api/products/{id}"), None)
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Product deleted successfully");
    // Soft delete keeps the row for order history.
    assert!(!app.product(id).await.is_active);
}

#[tokio::test]
async fn discount_must_be_below_price() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(
            Method::POST,
            "/api/products",
            Some(json!({
                "name": "Blender",
                "description": "Two speeds",
                "price": "2000",
                "discount_price": "2500",
                "stock": 3
            })),
        )
        .await;
    assert_eq!(response.status(), 400);

    let product = app.seed_product("Juicer", dec!(1500), 3).await;
    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/products/{}", product.id),
            Some(json!({ "discount_price": "1600" })),
        )
        .await;
    assert_eq!(response.status(), 400);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Discount price must be less than regular price");
}

#[tokio::test]
async fn customers_cannot_edit_products() {
    let app = TestApp::new().await;

    let response = app
        .as_customer(
            Method::POST,
            "/api/products",
            Some(json!({ "name": "Nope", "description": "x", "price": "1", "stock": 1 })),
        )
        .await;
    assert_eq!(response.status(), 403);
}
