#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use shopfront_api::{
    auth::hash_password,
    build_router,
    config::AppConfig,
    db,
    entities::{
        order,
        product::{self, DEFAULT_IMAGE_URL},
        user::{self, UserRole},
    },
    events::{self, EventSender},
    payments::{PaymentGateway, RazorpayGateway},
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "hunter22";
pub const GATEWAY_KEY_ID: &str = "rzp_test_key";
pub const GATEWAY_KEY_SECRET: &str = "rzp_test_secret";

/// Application harness backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    pub customer: user::Model,
    pub customer_token: String,
    pub admin: user::Model,
    pub admin_token: String,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh application without a payment gateway.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Fresh application whose Razorpay client points at `base_url` (a wiremock server).
    pub async fn with_gateway(base_url: &str) -> Self {
        let gateway = RazorpayGateway::new(base_url, GATEWAY_KEY_ID, GATEWAY_KEY_SECRET)
            .expect("build gateway client");
        Self::build(Some(Arc::new(gateway))).await
    }

    async fn build(gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for sqlite");
        let db_path = db_dir.path().join("shopfront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection serialises every transaction, like row locks would on Postgres.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = Arc::new(AppState::new(Arc::new(pool), cfg, event_sender, gateway));
        let router = build_router(state.clone());

        let customer = insert_user(&state, "Priya Sharma", "priya@example.com", UserRole::User).await;
        let admin = insert_user(&state, "Store Admin", "admin@example.com", UserRole::Admin).await;
        let customer_token = state.auth.issue_token(&customer).expect("customer token");
        let admin_token = state.auth.issue_token(&admin).expect("admin token");

        Self {
            router,
            state,
            customer,
            customer_token,
            admin,
            admin_token,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_customer(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.customer_token))
            .await
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.admin_token)).await
    }

    /// A second customer with their own token.
    pub async fn another_customer(&self, email: &str) -> (user::Model, String) {
        let user = insert_user(&self.state, "Arjun Mehta", email, UserRole::User).await;
        let token = self.state.auth.issue_token(&user).expect("token");
        (user, token)
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.seed_product_with(name, price, None, stock).await
    }

    pub async fn seed_product_with(
        &self,
        name: &str,
        price: Decimal,
        discount_price: Option<Decimal>,
        stock: i32,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(format!("{name} seeded for integration tests")),
            price: Set(price),
            discount_price: Set(discount_price),
            stock: Set(stock),
            category: Set(Some("Electronics".to_string())),
            image_url: Set(DEFAULT_IMAGE_URL.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn product(&self, id: Uuid) -> product::Model {
        product::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn stock_of(&self, id: Uuid) -> i32 {
        self.product(id).await.stock
    }

    pub async fn set_product_active(&self, id: Uuid, active: bool) {
        let mut model: product::ActiveModel = self.product(id).await.into();
        model.is_active = Set(active);
        model.update(&*self.state.db).await.expect("update product");
    }

    pub async fn order(&self, id: Uuid) -> order::Model {
        order::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("load order")
            .expect("order exists")
    }

    pub async fn add_to_cart(&self, token: &str, product_id: Uuid, quantity: i32) -> Response {
        self.request(
            Method::POST,
            "/api/cart/add",
            Some(json!({ "product_id": product_id, "quantity": quantity })),
            Some(token),
        )
        .await
    }

    pub async fn checkout(&self, token: &str) -> Response {
        self.request(
            Method::POST,
            "/api/orders/checkout",
            Some(json!({ "shipping_address": shipping_address() })),
            Some(token),
        )
        .await
    }

    /// Places a buy-now order as the default customer and returns the order JSON.
    pub async fn place_order(&self, product_id: Uuid, quantity: i32) -> Value {
        let response = self
            .as_customer(
                Method::POST,
                "/api/orders/buy-now",
                Some(json!({
                    "product_id": product_id,
                    "quantity": quantity,
                    "shipping_address": shipping_address(),
                })),
            )
            .await;
        assert_eq!(response.status(), 201, "buy-now should succeed");
        response_json(response).await["data"]["order"].clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

async fn insert_user(state: &AppState, name: &str, email: &str, role: UserRole) -> user::Model {
    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(TEST_PASSWORD).expect("hash password")),
        role: Set(role),
        phone: Set(None),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("seed user")
}

pub fn shipping_address() -> Value {
    json!({
        "name": "Priya Sharma",
        "street": "14 Residency Road",
        "city": "Bengaluru",
        "state": "Karnataka",
        "postal_code": "560025",
        "phone": "9876543210"
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Decimals serialise as strings; the stored scale can vary, so compare numerically.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("expected a decimal, got {other}"),
    }
}

pub fn uuid_of(value: &Value) -> Uuid {
    Uuid::parse_str(value.as_str().expect("uuid string")).expect("valid uuid")
}
