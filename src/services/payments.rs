use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    orders::{cancel_within, Cancellation, CancellationOrigin, StockRestoration},
    pricing::to_minor_units,
};
use crate::{
    entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    payments::{GatewayOrderRequest, PaymentGateway, RefundRequest},
};

pub const DEFAULT_REFUND_NOTE: &str = "Refund requested";
pub const DEFAULT_REFUND_REASON: &str = "Refund processed";

/// What a client needs to open the gateway's hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    /// Gateway order id.
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentStatusView {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
}

impl From<&order::Model> for PaymentStatusView {
    fn from(order: &order::Model) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            payment_status: order.payment_status,
            order_status: order.status,
            total_amount: order.total_amount,
            payment_method: order.payment_method,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Default)]
pub struct RefundInput {
    pub order_id: Uuid,
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub amount: Option<i64>,
    pub order: PaymentStatusView,
}

/// Connects orders to the configured payment gateway.
///
/// With no gateway configured, everything except the status read fails with `ServiceUnavailable`.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    currency: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db,
            event_sender,
            gateway,
            currency: currency.into(),
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>, ServiceError> {
        self.gateway
            .as_ref()
            .ok_or_else(|| ServiceError::ServiceUnavailable("Payment gateway not available".into()))
    }

    async fn find_owned(&self, user_id: Uuid, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))
    }

    /// Opens a gateway order for the full order total and remembers its id on the order.
    #[instrument(skip(self))]
    pub async fn create_intent(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<PaymentIntent, ServiceError> {
        let gateway = self.gateway()?;
        let order = self.find_owned(user_id, order_id).await?;
        if order.payment_status == PaymentStatus::Completed {
            return Err(ServiceError::BadRequest("Order is already paid".into()));
        }
        if !order.status.accepts_payment() || order.payment_status == PaymentStatus::Refunded {
            return Err(ServiceError::InvalidTransition(
                "Order can no longer be paid".into(),
            ));
        }

        let gateway_order = gateway
            .create_order(&GatewayOrderRequest {
                amount: to_minor_units(order.total_amount)?,
                currency: self.currency.clone(),
                receipt: order.id.to_string(),
            })
            .await?;

        let mut active: order::ActiveModel = order.into();
        active.razorpay_order_id = Set(Some(gateway_order.id.clone()));
        active.updated_at = Set(Utc::now());
        active.update(&*self.db).await?;

        Ok(PaymentIntent {
            order_id: gateway_order.id,
            amount: gateway_order.amount,
            currency: gateway_order.currency,
            key_id: gateway.key_id().to_string(),
        })
    }

    /// Checks the gateway signature and marks the payment completed and the order processing.
    #[instrument(skip(self, confirmation), fields(gateway_order_id = %confirmation.gateway_order_id))]
    pub async fn confirm(
        &self,
        user_id: Uuid,
        confirmation: PaymentConfirmation,
    ) -> Result<PaymentStatusView, ServiceError> {
        let gateway = self.gateway()?;
        let order = order::Entity::find()
            .filter(order::Column::RazorpayOrderId.eq(confirmation.gateway_order_id.clone()))
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;

        if !gateway.verify_signature(
            &confirmation.gateway_order_id,
            &confirmation.payment_id,
            &confirmation.signature,
        ) {
            warn!(order_id = %order.id, "payment signature mismatch");
            return Err(ServiceError::GatewaySignatureMismatch("Invalid signature".into()));
        }

        // Only an open, unpaid order may move to processing.
        let result = order::Entity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Completed),
            )
            .col_expr(
                order::Column::TransactionId,
                Expr::value(Some(confirmation.payment_id.clone())),
            )
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Processing))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.is_in(OrderStatus::PAYABLE))
            .filter(order::Column::PaymentStatus.is_in(PaymentStatus::AWAITING))
            .exec(&*self.db)
            .await?;
        if result.rows_affected != 1 {
            warn!(
                order_id = %order.id,
                status = %order.status,
                "confirmation for an order that is not awaiting payment"
            );
            return Err(if order.payment_status == PaymentStatus::Completed {
                ServiceError::BadRequest("Order is already paid".into())
            } else {
                ServiceError::InvalidTransition("Order can no longer be paid".into())
            });
        }

        let order = order::Entity::find_by_id(order.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;

        counter!("shopfront.payments.confirmed", 1);
        info!(order_id = %order.id, "payment confirmed");
        self.event_sender.send_or_log(Event::PaymentCompleted {
            order_id: order.id,
            transaction_id: confirmation.payment_id,
        });

        Ok(PaymentStatusView::from(&order))
    }

    pub async fn status(&self, user_id: Uuid, order_id: Uuid) -> Result<PaymentStatusView, ServiceError> {
        let order = self.find_owned(user_id, order_id).await?;
        Ok(PaymentStatusView::from(&order))
    }

    /// Refunds a completed payment through the gateway, then cancels the order.
    ///
    /// Unlike a customer cancel, a refund does not put stock back.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn refund(&self, input: RefundInput) -> Result<RefundOutcome, ServiceError> {
        let gateway = self.gateway()?;
        let order = order::Entity::find_by_id(input.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".into()))?;

        let payment_id = match (&order.payment_status, &order.transaction_id) {
            (PaymentStatus::Completed, Some(id)) => id.clone(),
            _ => return Err(ServiceError::BadRequest("Payment not completed".into())),
        };

        let reason = input.reason.filter(|r| !r.trim().is_empty());
        let mut notes = BTreeMap::new();
        notes.insert(
            "reason".to_string(),
            reason.clone().unwrap_or_else(|| DEFAULT_REFUND_NOTE.to_string()),
        );
        notes.insert("order_id".to_string(), order.id.to_string());
        let amount = input.amount.map(to_minor_units).transpose()?;

        let refund = gateway
            .refund(&payment_id, &RefundRequest { amount, notes })
            .await?;

        let cancellation = Cancellation {
            origin: CancellationOrigin::Refund,
            reason: reason.unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string()),
            stock: StockRestoration::Keep,
        };
        let event_reason = cancellation.reason.clone();
        let order = self
            .db
            .transaction::<_, order::Model, ServiceError>(move |txn| {
                Box::pin(async move { cancel_within(txn, &order, &cancellation).await })
            })
            .await?;

        counter!("shopfront.payments.refunded", 1);
        info!(order_id = %order.id, refund_id = %refund.id, "payment refunded");
        self.event_sender.send_or_log(Event::PaymentRefunded {
            order_id: order.id,
            refund_id: refund.id.clone(),
        });
        self.event_sender.send_or_log(Event::OrderCancelled {
            order_id: order.id,
            reason: event_reason,
            stock_restored: false,
        });

        Ok(RefundOutcome {
            refund_id: refund.id,
            amount: refund.amount.or(amount),
            order: PaymentStatusView::from(&order),
        })
    }
}
