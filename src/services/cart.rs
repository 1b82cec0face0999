use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TryInsertResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        cart, cart_item,
        product::{self, StockStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// One cart line joined with the live product it points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub name: String,
    pub image_url: String,
    pub stock: i32,
    pub stock_status: StockStatus,
    pub is_active: bool,
    pub quantity: i32,
    /// Effective price captured at the last write to this line.
    pub price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartLineView>,
    pub total_items: i32,
    pub total_amount: Decimal,
}

impl CartView {
    fn build(cart: &cart::Model, lines: Vec<(cart_item::Model, product::Model)>) -> Self {
        let items: Vec<CartLineView> = lines
            .into_iter()
            .map(|(item, product)| CartLineView {
                product_id: item.product_id,
                line_total: item.line_total(),
                name: product.name.clone(),
                stock_status: product.stock_status(),
                image_url: product.image_url,
                stock: product.stock,
                is_active: product.is_active,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        Self {
            id: cart.id,
            user_id: cart.user_id,
            total_items: items.iter().map(|l| l.quantity).sum(),
            total_amount: items.iter().map(|l| l.line_total).sum(),
            items,
        }
    }
}

/// Per-user shopping cart.
///
/// Carts are created on first access and only ever emptied, never deleted. Every line carries a
/// price snapshot that is refreshed on each add or update of that line.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn find_cart(&self, user_id: Uuid) -> Result<Option<cart::Model>, ServiceError> {
        Ok(cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    async fn require_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        self.find_cart(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".into()))
    }

    async fn find_or_create_cart(&self, user_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = self.find_cart(user_id).await? {
            return Ok(cart);
        }

        let now = Utc::now();
        let candidate = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        // A concurrent first request may have created the cart already; keep whichever won.
        let inserted = cart::Entity::insert(candidate)
            .on_conflict(
                OnConflict::column(cart::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec_without_returning(&*self.db)
            .await?;
        if matches!(inserted, TryInsertResult::Inserted(_)) {
            debug!(%user_id, "cart created");
        }

        self.find_cart(user_id)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Cart could not be created".into()))
    }

    async fn find_line(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        Ok(cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?)
    }

    async fn touch(&self, cart: &cart::Model) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.clone().into();
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;
        Ok(())
    }

    /// Writes `quantity` at the product's current effective price, inserting the line if needed.
    async fn upsert_line(
        &self,
        cart: &cart::Model,
        existing: Option<cart_item::Model>,
        product: &product::Model,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        match existing {
            Some(line) => {
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.price = Set(product.effective_price());
                active.updated_at = Set(now);
                active.update(&*self.db).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    quantity: Set(quantity),
                    price: Set(product.effective_price()),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }
        self.touch(cart).await
    }

    /// Loads the cart view, dropping (and deleting) lines whose product is gone, inactive or out
    /// of stock.
    async fn heal_and_view(&self, cart: &cart::Model) -> Result<CartView, ServiceError> {
        let rows = cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        let mut stale = Vec::new();
        let mut lines = Vec::with_capacity(rows.len());
        for (item, product) in rows {
            match product {
                Some(p) if p.is_purchasable() => lines.push((item, p)),
                _ => stale.push(item.id),
            }
        }

        if !stale.is_empty() {
            let removed = cart_item::Entity::delete_many()
                .filter(cart_item::Column::Id.is_in(stale))
                .exec(&*self.db)
                .await?;
            info!(cart_id = %cart.id, removed = removed.rows_affected, "removed unavailable cart lines");
        }

        Ok(CartView::build(cart, lines))
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.find_or_create_cart(user_id).await?;
        self.heal_and_view(&cart).await
    }

    /// Adds `quantity` units, merging with an existing line for the same product.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound("Product not found or unavailable".into()))?;

        if product.stock < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} items available in stock",
                product.stock
            )));
        }

        let cart = self.find_or_create_cart(user_id).await?;
        let existing = self.find_line(cart.id, product_id).await?;
        let in_cart = existing.as_ref().map(|l| l.quantity).unwrap_or(0);
        let wanted = in_cart + quantity;
        if wanted > product.stock {
            return Err(ServiceError::InsufficientStock(format!(
                "Cannot add {} items. Only {} more items available",
                quantity,
                product.stock - in_cart
            )));
        }

        self.upsert_line(&cart, existing, &product, wanted).await?;
        info!(cart_id = %cart.id, %product_id, quantity = wanted, "cart line written");
        self.heal_and_view(&cart).await
    }

    /// Sets the line quantity; zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        let cart = self.require_cart(user_id).await?;
        let line = self
            .find_line(cart.id, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item not found in cart".into()))?;

        if quantity <= 0 {
            line.delete(&*self.db).await?;
            self.touch(&cart).await?;
            return self.heal_and_view(&cart).await;
        }

        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ServiceError::NotFound("Product no longer available".into()))?;

        if product.stock < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} items available in stock",
                product.stock
            )));
        }

        self.upsert_line(&cart, Some(line), &product, quantity).await?;
        self.heal_and_view(&cart).await
    }

    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let cart = self.require_cart(user_id).await?;
        let line = self
            .find_line(cart.id, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Item not found in cart".into()))?;

        line.delete(&*self.db).await?;
        self.touch(&cart).await?;
        self.heal_and_view(&cart).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.require_cart(user_id).await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&*self.db)
            .await?;
        self.touch(&cart).await?;

        self.event_sender.send_or_log(Event::CartCleared { user_id });
        Ok(CartView::build(&cart, Vec::new()))
    }
}
