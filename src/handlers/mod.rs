pub mod auth;
pub mod cart;
pub mod common;
pub mod orders;
pub mod payments;
pub mod products;

use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    payments::PaymentGateway,
    services::{
        cart::CartService, catalog::CatalogService, checkout::CheckoutService,
        orders::OrderService, payments::PaymentService, pricing::PricingPolicy,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        pricing: PricingPolicy,
        gateway: Option<Arc<dyn PaymentGateway>>,
        currency: &str,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(db_pool.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                event_sender.clone(),
                pricing,
            )),
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            payments: Arc::new(PaymentService::new(db_pool, event_sender, gateway, currency)),
        }
    }
}
