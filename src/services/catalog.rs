use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Select, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::Pagination;
use crate::{
    entities::product::{self, StockStatus, DEFAULT_IMAGE_URL},
    errors::ServiceError,
};

/// A product as the storefront shows it, with its derived pricing and stock band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: product::Model,
    pub effective_price: Decimal,
    pub stock_status: StockStatus,
}

impl From<product::Model> for ProductView {
    fn from(product: product::Model) -> Self {
        Self {
            effective_price: product.effective_price(),
            stock_status: product.stock_status(),
            product,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPage {
    pub products: Vec<ProductView>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    Price,
    Name,
    CreatedAt,
    Stock,
}

impl ProductSort {
    fn column(self) -> product::Column {
        match self {
            ProductSort::Price => product::Column::Price,
            ProductSort::Name => product::Column::Name,
            ProductSort::CreatedAt => product::Column::CreatedAt,
            ProductSort::Stock => product::Column::Stock,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort_by: Option<ProductSort>,
    pub sort_order: SortOrder,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub discount_price: Option<Decimal>,
    pub stock: i32,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub discount_price: Option<Decimal>,
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

fn check_discount(price: Decimal, discount: Option<Decimal>) -> Result<(), ServiceError> {
    match discount {
        Some(d) if d >= price => Err(ServiceError::ValidationError(
            "Discount price must be less than regular price".into(),
        )),
        _ => Ok(()),
    }
}

/// Storefront catalog. Public reads only ever see active products.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn active() -> Select<product::Entity> {
        product::Entity::find().filter(product::Column::IsActive.eq(true))
    }

    async fn page_of(
        &self,
        query: Select<product::Entity>,
        page: u64,
        limit: u64,
    ) -> Result<ProductPage, ServiceError> {
        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(ProductPage {
            products: products.into_iter().map(ProductView::from).collect(),
            pagination: Pagination::new(page, limit, total),
        })
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: ProductQuery) -> Result<ProductPage, ServiceError> {
        let mut select = Self::active();

        if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            select = select.filter(
                Condition::any()
                    .add(product::Column::Name.contains(term))
                    .add(product::Column::Description.contains(term)),
            );
        }
        if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
            select = select.filter(product::Column::Category.eq(category));
        }
        if let Some(min) = query.min_price {
            select = select.filter(product::Column::Price.gte(min));
        }
        if let Some(max) = query.max_price {
            select = select.filter(product::Column::Price.lte(max));
        }

        select = match (query.sort_by, query.sort_order) {
            (Some(sort), SortOrder::Asc) => select.order_by_asc(sort.column()),
            (Some(sort), SortOrder::Desc) => select.order_by_desc(sort.column()),
            (None, _) => select.order_by_desc(product::Column::CreatedAt),
        };

        self.page_of(select, query.page, query.limit).await
    }

    /// Distinct categories that have at least one active product.
    pub async fn categories(&self) -> Result<Vec<String>, ServiceError> {
        let categories: Vec<Option<String>> = Self::active()
            .select_only()
            .column(product::Column::Category)
            .filter(product::Column::Category.is_not_null())
            .distinct()
            .order_by_asc(product::Column::Category)
            .into_tuple()
            .all(&*self.db)
            .await?;
        Ok(categories.into_iter().flatten().collect())
    }

    pub async fn by_category(
        &self,
        category: &str,
        page: u64,
        limit: u64,
    ) -> Result<ProductPage, ServiceError> {
        let select = Self::active()
            .filter(product::Column::Category.eq(category))
            .order_by_desc(product::Column::CreatedAt);
        self.page_of(select, page, limit).await
    }

    pub async fn get(&self, product_id: Uuid) -> Result<ProductView, ServiceError> {
        Self::active()
            .filter(product::Column::Id.eq(product_id))
            .one(&*self.db)
            .await?
            .map(ProductView::from)
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))
    }

    async fn find_any(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewProduct) -> Result<ProductView, ServiceError> {
        check_discount(input.price, input.discount_price)?;

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description.trim().to_string()),
            price: Set(input.price),
            discount_price: Set(input.discount_price),
            stock: Set(input.stock),
            category: Set(input.category.map(|c| c.trim().to_string())),
            image_url: Set(input
                .image_url
                .unwrap_or_else(|| DEFAULT_IMAGE_URL.to_string())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %product.id, "product created");
        Ok(product.into())
    }

    /// Partial update; also reaches soft-deleted products so they can be reactivated.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        product_id: Uuid,
        changes: ProductChanges,
    ) -> Result<ProductView, ServiceError> {
        let existing = self.find_any(product_id).await?;
        check_discount(
            changes.price.unwrap_or(existing.price),
            changes.discount_price.or(existing.discount_price),
        )?;

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = changes.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = changes.description {
            active.description = Set(description.trim().to_string());
        }
        if let Some(price) = changes.price {
            active.price = Set(price);
        }
        if let Some(discount) = changes.discount_price {
            active.discount_price = Set(Some(discount));
        }
        if let Some(stock) = changes.stock {
            active.stock = Set(stock);
        }
        if let Some(category) = changes.category {
            active.category = Set(Some(category.trim().to_string()));
        }
        if let Some(image_url) = changes.image_url {
            active.image_url = Set(image_url);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let product = active.update(&*self.db).await?;
        info!(%product_id, "product updated");
        Ok(product.into())
    }

    /// Soft delete: the row stays so historical orders and carts keep resolving it.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, product_id: Uuid) -> Result<ProductView, ServiceError> {
        let existing = self.find_any(product_id).await?;
        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let product = active.update(&*self.db).await?;
        info!(%product_id, "product deactivated");
        Ok(product.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn discount_must_undercut_price() {
        assert!(check_discount(dec!(100), None).is_ok());
        assert!(check_discount(dec!(100), Some(dec!(99.99))).is_ok());
        assert!(matches!(
            check_discount(dec!(100), Some(dec!(100))),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn sort_keys_deserialize_from_query_strings() {
        let sort: ProductSort = serde_json::from_str("\"created_at\"").unwrap();
        assert_eq!(sort, ProductSort::CreatedAt);
        let order: SortOrder = serde_json::from_str("\"asc\"").unwrap();
        assert_eq!(order, SortOrder::Asc);
        assert_eq!(SortOrder::default(), SortOrder::Desc);
    }
}
