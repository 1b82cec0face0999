//! Domain events.
//!
//! Services publish events after their transaction commits. Delivery is best effort: a full or
//! closed channel is logged and never fails the originating request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        user_id: Uuid,
        total_amount: Decimal,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: String,
        stock_restored: bool,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentCompleted {
        order_id: Uuid,
        transaction_id: String,
    },
    PaymentRefunded {
        order_id: Uuid,
        refund_id: String,
    },
    CartCleared {
        user_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::PaymentCompleted { .. } => "payment_completed",
            Event::PaymentRefunded { .. } => "payment_refunded",
            Event::CartCleared { .. } => "cart_cleared",
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Bounded channel plus its sender handle.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes without waiting; drops and logs the event when the channel is full or closed.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(err) = self.sender.try_send(event) {
            warn!(event = name, error = %err, "dropping domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                user_id,
                total_amount,
            } => info!(%order_id, %order_number, %user_id, %total_amount, "order created"),
            Event::OrderCancelled {
                order_id,
                reason,
                stock_restored,
            } => info!(%order_id, %reason, stock_restored, "order cancelled"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::PaymentCompleted {
                order_id,
                transaction_id,
            } => info!(%order_id, %transaction_id, "payment completed"),
            Event::PaymentRefunded { order_id, refund_id } => {
                info!(%order_id, %refund_id, "payment refunded")
            }
            Event::CartCleared { user_id } => info!(%user_id, "cart cleared"),
        }
    }

    info!("Event processing loop stopped");
}
