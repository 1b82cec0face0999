//! Order queries and status changes after creation.
//!
//! Orders are created by [`super::checkout::CheckoutService`]. From then on only status, payment
//! and fulfilment columns change, and the totals are never rewritten.

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, LoaderTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Pagination;
use crate::{
    entities::{
        order::{self, OrderStatus, PaymentStatus},
        order_item, product, user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

pub const DEFAULT_CANCEL_REASON: &str = "Cancelled by user";

/// An order with its line items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminOrderView {
    #[serde(flatten)]
    pub details: OrderDetails,
    pub customer: Option<CustomerSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPage<T> {
    pub orders: Vec<T>,
    pub pagination: Pagination,
}

/// Whether cancelling an order puts its line quantities back on the shelf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockRestoration {
    Restore,
    Keep,
}

impl StockRestoration {
    pub fn restores(self) -> bool {
        self == StockRestoration::Restore
    }
}

/// Who is cancelling, which decides the status guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationOrigin {
    /// Regular lifecycle cancel, allowed only from `pending` or `processing`.
    Customer,
    /// Gateway refund. Cancels from any status, once, and marks the completed payment refunded.
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub origin: CancellationOrigin,
    pub reason: String,
    pub stock: StockRestoration,
}

impl Cancellation {
    pub fn by_customer(reason: Option<String>) -> Self {
        Self {
            origin: CancellationOrigin::Customer,
            reason: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string()),
            stock: StockRestoration::Restore,
        }
    }
}

/// Cancels `order` on `conn`, which should be an open transaction.
///
/// The status write is guarded so that two concurrent cancels of the same order cannot both
/// succeed; stock is restored only by the one whose guarded update matched.
pub(crate) async fn cancel_within<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
    cancellation: &Cancellation,
) -> Result<order::Model, ServiceError> {
    let now = Utc::now();
    let mut update = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
        .col_expr(order::Column::CancelledAt, Expr::value(Some(now)))
        .col_expr(
            order::Column::CancellationReason,
            Expr::value(Some(cancellation.reason.clone())),
        )
        .col_expr(order::Column::UpdatedAt, Expr::value(now))
        .filter(order::Column::Id.eq(order.id));

    match cancellation.origin {
        CancellationOrigin::Customer => {
            update = update.filter(order::Column::Status.is_in(OrderStatus::CANCELLABLE));
        }
        CancellationOrigin::Refund => {
            update = update
                .col_expr(
                    order::Column::PaymentStatus,
                    Expr::value(PaymentStatus::Refunded),
                )
                .filter(order::Column::PaymentStatus.eq(PaymentStatus::Completed));
        }
    }

    let result = update.exec(conn).await?;
    if result.rows_affected != 1 {
        return Err(match cancellation.origin {
            CancellationOrigin::Customer => {
                ServiceError::InvalidTransition("Order cannot be cancelled at this stage".into())
            }
            CancellationOrigin::Refund => ServiceError::BadRequest("Payment not completed".into()),
        });
    }

    if cancellation.stock.restores() {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(conn)
            .await?;
        for item in items {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(item.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(item.product_id))
                .exec(conn)
                .await?;
        }
    }

    order::Entity::find_by_id(order.id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Order not found".into()))
}

#[derive(Debug, Clone, Default)]
pub struct AdminOrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    async fn with_items(&self, orders: Vec<order::Model>) -> Result<Vec<OrderDetails>, ServiceError> {
        let items = orders.load_many(order_item::Entity, &*self.db).await?;
        Ok(orders
            .into_iter()
            .zip(items)
            .map(|(order, items)| OrderDetails { order, items })
            .collect())
    }

    pub async fn details(&self, order: order::Model) -> Result<OrderDetails, ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;
        Ok(OrderDetails { order, items })
    }

    /// The caller's order, or `NotFound` when it does not exist or belongs to someone else.
    pub async fn find_owned(&self, user_id: Uuid, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))
    }

    #[instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<OrderPage<OrderDetails>, ServiceError> {
        let paginator = order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(OrderPage {
            orders: self.with_items(orders).await?,
            pagination: Pagination::new(page, limit, total),
        })
    }

    pub async fn get_for_user(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = self.find_owned(user_id, order_id).await?;
        self.details(order).await
    }

    /// Customer cancel: allowed from `pending` or `processing`, restores stock.
    #[instrument(skip(self, reason))]
    pub async fn cancel_for_user(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderDetails, ServiceError> {
        let cancellation = Cancellation::by_customer(reason);
        let event_reason = cancellation.reason.clone();

        let order = self
            .db
            .transaction::<_, order::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let order = order::Entity::find_by_id(order_id)
                        .filter(order::Column::UserId.eq(user_id))
                        .one(txn)
                        .await?
                        .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;

                    if !order.status.is_cancellable() {
                        return Err(ServiceError::InvalidTransition(
                            "Order cannot be cancelled at this stage".into(),
                        ));
                    }

                    cancel_within(txn, &order, &cancellation).await
                })
            })
            .await?;

        counter!("shopfront.orders.cancelled", 1);
        info!(order_id = %order.id, "order cancelled by customer");
        self.event_sender.send_or_log(Event::OrderCancelled {
            order_id: order.id,
            reason: event_reason,
            stock_restored: true,
        });

        self.details(order).await
    }

    #[instrument(skip(self))]
    pub async fn admin_list(
        &self,
        filter: AdminOrderFilter,
        page: u64,
        limit: u64,
    ) -> Result<OrderPage<AdminOrderView>, ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.filter(order::Column::PaymentStatus.eq(payment_status));
        }

        let paginator = query.paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        let customers = orders.load_one(user::Entity, &*self.db).await?;
        let details = self.with_items(orders).await?;

        let orders = details
            .into_iter()
            .zip(customers)
            .map(|(details, customer)| AdminOrderView {
                details,
                customer: customer.map(|u| CustomerSummary {
                    name: u.name,
                    email: u.email,
                }),
            })
            .collect();

        Ok(OrderPage {
            orders,
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Administrative status override.
    ///
    /// Any status may be set from any other; lifecycle rules are not checked here. Stock is never
    /// touched, so moving an order to `cancelled` this way does not restock it.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        tracking_number: Option<String>,
    ) -> Result<OrderDetails, ServiceError> {
        let existing = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;
        let old_status = existing.status;

        if old_status != status && !old_status.can_transition_to(status) {
            warn!(%order_id, from = %old_status, to = %status, "administrative status override");
        }

        let now = Utc::now();
        let mut active: order::ActiveModel = existing.into();
        active.status = Set(status);
        if let Some(tracking) = tracking_number.filter(|t| !t.trim().is_empty()) {
            active.tracking_number = Set(Some(tracking));
        }
        if status == OrderStatus::Delivered {
            active.delivered_at = Set(Some(now));
        }
        active.updated_at = Set(now);
        let order = active.update(&*self.db).await?;

        self.event_sender.send_or_log(Event::OrderStatusChanged {
            order_id,
            old_status,
            new_status: status,
        });

        self.details(order).await
    }
}
