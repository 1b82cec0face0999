use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::common::{
    created_response, message_response, success_response, validate_input,
    validate_non_negative_amount, validation_error, PageParams,
};
use crate::{
    auth::{AuthRouterExt, ADMIN_ROLE},
    errors::ServiceError,
    services::catalog::{NewProduct, ProductChanges, ProductQuery, ProductSort, SortOrder},
    AppState,
};

pub const CATALOG_PAGE_SIZE: u64 = 50;
pub const CATEGORY_PAGE_SIZE: u64 = 10;

pub fn product_routes() -> Router<Arc<AppState>> {
    let public = Router::new()
        .route("/", get(list_products))
        .route("/categories", get(list_categories))
        .route("/category/:category", get(products_by_category))
        .route("/:id", get(get_product));

    let admin = Router::new()
        .route("/", axum::routing::post(create_product))
        .route(
            "/:id",
            axum::routing::put(update_product).delete(delete_product),
        )
        .with_role(ADMIN_ROLE);

    public.merge(admin)
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort_by: Option<ProductSort>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

fn discount_below_price(price: Decimal, discount: Option<Decimal>) -> Result<(), ValidationError> {
    match discount {
        Some(d) if d >= price => Err(validation_error(
            "discount_price",
            "Discount price must be less than regular price",
        )),
        _ => Ok(()),
    }
}

fn validate_new_discount(body: &CreateProductBody) -> Result<(), ValidationError> {
    discount_below_price(body.price, body.discount_price)
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_new_discount"))]
pub struct CreateProductBody {
    #[validate(length(min = 1, max = 100, message = "Product name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 1000, message = "Description must be between 1 and 1000 characters"))]
    pub description: String,
    #[validate(custom = "validate_non_negative_amount")]
    pub price: Decimal,
    #[validate(custom = "validate_non_negative_amount")]
    pub discount_price: Option<Decimal>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[validate(length(min = 1, max = 50, message = "Category must be between 1 and 50 characters"))]
    pub category: Option<String>,
    #[validate(url(message = "Image must be a valid URL"))]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductBody {
    #[validate(length(min = 1, max = 100, message = "Product name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 1000, message = "Description must be between 1 and 1000 characters"))]
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative_amount")]
    pub price: Option<Decimal>,
    #[validate(custom = "validate_non_negative_amount")]
    pub discount_price: Option<Decimal>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
    #[validate(length(min = 1, max = 50, message = "Category must be between 1 and 50 characters"))]
    pub category: Option<String>,
    #[validate(url(message = "Image must be a valid URL"))]
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = PageParams {
        page: query.page,
        limit: query.limit,
    }
    .resolve(CATALOG_PAGE_SIZE);

    let products = state
        .services
        .catalog
        .list(ProductQuery {
            search: query.search,
            category: query.category,
            min_price: query.min_price,
            max_price: query.max_price,
            sort_by: query.sort_by,
            sort_order: query.sort_order.unwrap_or_default(),
            page,
            limit,
        })
        .await?;
    Ok(success_response(products))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let categories = state.services.catalog.categories().await?;
    Ok(success_response(json!({ "categories": categories })))
}

async fn products_by_category(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = params.resolve(CATEGORY_PAGE_SIZE);
    let products = state
        .services
        .catalog
        .by_category(&category, page, limit)
        .await?;
    Ok(success_response(products))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.get(product_id).await?;
    Ok(success_response(json!({ "product": product })))
}

async fn create_product(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProductBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .create(NewProduct {
            name: payload.name,
            description: payload.description,
            price: payload.price,
            discount_price: payload.discount_price,
            stock: payload.stock,
            category: payload.category,
            image_url: payload.image_url,
        })
        .await?;
    Ok(created_response(
        "Product created successfully",
        json!({ "product": product }),
    ))
}

async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateProductBody>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let product = state
        .services
        .catalog
        .update(
            product_id,
            ProductChanges {
                name: payload.name,
                description: payload.description,
                price: payload.price,
                discount_price: payload.discount_price,
                stock: payload.stock,
                category: payload.category,
                image_url: payload.image_url,
                is_active: payload.is_active,
            },
        )
        .await?;
    Ok(message_response(
        "Product updated successfully",
        json!({ "product": product }),
    ))
}

/// Soft delete.
async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.deactivate(product_id).await?;
    Ok(message_response("Product deleted successfully", json!({})))
}
