//! Checkout transaction engine.
//!
//! Turns a cart, or a single product for buy-now, into an order in one database transaction:
//! every product is re-read inside the transaction, stock is taken with a guarded decrement, the
//! order and its lines are written, and for cart checkout the cart is emptied. Any error rolls
//! the whole unit back, so either all of it happened or none of it did.

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    orders::OrderDetails,
    pricing::{OrderDraft, OrderLine, PricingPolicy, ShippingAddress},
};
use crate::{
    entities::{cart, cart_item, order::PaymentMethod, product},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Shipping and payment details shared by cart checkout and buy-now.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

/// Takes `quantity` units of `product_id` if it is still active and has enough stock.
///
/// Returns `false` when the guard did not match, which means a concurrent checkout consumed the
/// stock (or deactivated the product) after it was read.
async fn take_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<bool, ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::IsActive.eq(true))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Writes the draft's order row and lines.
async fn persist_order(
    txn: &DatabaseTransaction,
    draft: OrderDraft,
) -> Result<OrderDetails, ServiceError> {
    let (order, items) = draft.into_active_models(Utc::now());
    let order = order.insert(txn).await?;
    let mut saved = Vec::with_capacity(items.len());
    for item in items {
        saved.push(item.insert(txn).await?);
    }
    Ok(OrderDetails {
        order,
        items: saved,
    })
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    pricing: PricingPolicy,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        pricing: PricingPolicy,
    ) -> Self {
        Self {
            db,
            event_sender,
            pricing,
        }
    }

    fn announce(&self, placed: &OrderDetails) {
        counter!("shopfront.orders.created", 1);
        info!(
            order_id = %placed.order.id,
            order_number = %placed.order.order_number,
            total = %placed.order.total_amount,
            "order placed"
        );
        self.event_sender.send_or_log(Event::OrderCreated {
            order_id: placed.order.id,
            order_number: placed.order.order_number.clone(),
            user_id: placed.order.user_id,
            total_amount: placed.order.total_amount,
        });
    }

    /// Places an order for everything in the user's cart at the captured cart prices, then
    /// empties the cart.
    #[instrument(skip(self, request))]
    pub async fn checkout_cart(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<OrderDetails, ServiceError> {
        let policy = self.pricing;

        let placed = self
            .db
            .transaction::<_, OrderDetails, ServiceError>(move |txn| {
                Box::pin(async move {
                    let cart = cart::Entity::find()
                        .filter(cart::Column::UserId.eq(user_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::BadRequest("Cart is empty".into()))?;

                    let items = cart_item::Entity::find()
                        .filter(cart_item::Column::CartId.eq(cart.id))
                        .order_by_asc(cart_item::Column::CreatedAt)
                        .all(txn)
                        .await?;
                    if items.is_empty() {
                        return Err(ServiceError::BadRequest("Cart is empty".into()));
                    }

                    let mut lines = Vec::with_capacity(items.len());
                    for item in &items {
                        let product = match product::Entity::find_by_id(item.product_id)
                            .one(txn)
                            .await?
                        {
                            Some(p) if p.is_active => p,
                            found => {
                                let label = found
                                    .map(|p| p.name)
                                    .unwrap_or_else(|| item.product_id.to_string());
                                return Err(ServiceError::ProductUnavailable(format!(
                                    "Product {label} is no longer available"
                                )));
                            }
                        };

                        let insufficient = |available: i32| {
                            ServiceError::InsufficientStock(format!(
                                "Insufficient stock for {}. Only {} items available",
                                product.name, available
                            ))
                        };
                        if product.stock < item.quantity {
                            return Err(insufficient(product.stock));
                        }
                        if !take_stock(txn, product.id, item.quantity).await? {
                            counter!("shopfront.checkout.stock_conflicts", 1);
                            warn!(product_id = %product.id, "stock taken by a concurrent checkout");
                            return Err(insufficient(0));
                        }

                        lines.push(OrderLine::new(
                            product.id,
                            product.name.clone(),
                            item.quantity,
                            item.price,
                        ));
                    }

                    let draft = OrderDraft::priced(
                        user_id,
                        lines,
                        request.shipping_address,
                        request.payment_method,
                        request.notes,
                        &policy,
                    );
                    let placed = persist_order(txn, draft).await?;

                    cart_item::Entity::delete_many()
                        .filter(cart_item::Column::CartId.eq(cart.id))
                        .exec(txn)
                        .await?;

                    Ok(placed)
                })
            })
            .await?;

        self.announce(&placed);
        self.event_sender.send_or_log(Event::CartCleared { user_id });
        Ok(placed)
    }

    /// Places an order for a single product at its current effective price. The cart is not
    /// touched.
    #[instrument(skip(self, request))]
    pub async fn buy_now(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        request: CheckoutRequest,
    ) -> Result<OrderDetails, ServiceError> {
        let policy = self.pricing;

        let placed = self
            .db
            .transaction::<_, OrderDetails, ServiceError>(move |txn| {
                Box::pin(async move {
                    let product = product::Entity::find_by_id(product_id)
                        .one(txn)
                        .await?
                        .filter(|p| p.is_active)
                        .ok_or_else(|| {
                            ServiceError::ProductUnavailable(
                                "Product not found or unavailable".into(),
                            )
                        })?;

                    if product.stock < quantity {
                        return Err(ServiceError::InsufficientStock(format!(
                            "Insufficient stock. Only {} items available",
                            product.stock
                        )));
                    }
                    if !take_stock(txn, product.id, quantity).await? {
                        counter!("shopfront.checkout.stock_conflicts", 1);
                        return Err(ServiceError::InsufficientStock(
                            "Insufficient stock. Only 0 items available".into(),
                        ));
                    }

                    let line = OrderLine::new(
                        product.id,
                        product.name.clone(),
                        quantity,
                        product.effective_price(),
                    );
                    let draft = OrderDraft::priced(
                        user_id,
                        vec![line],
                        request.shipping_address,
                        request.payment_method,
                        request.notes,
                        &policy,
                    );
                    persist_order(txn, draft).await
                })
            })
            .await?;

        self.announce(&placed);
        Ok(placed)
    }
}
