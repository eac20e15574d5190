#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use luxemart_api::{
    config::AppConfig,
    db,
    entities::{order, payment, product, user, OrderStatus, UserRole},
    events::{self, EventSender},
    services::{
        catalog::CreateProductRequest, money::format_amount,
        signature::compute_callback_signature,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const MERCHANT_KEY: &str = "GTKFFx";
pub const MERCHANT_SALT: &str = "eCwWELxi";
pub const FRONTEND_URL: &str = "http://shop.test";
pub const JWT_SECRET: &str = "k8Jd0qLw2nVx7Rb4Tz1mYc9Hs3Fp6Ge5Ua0Oi2Ke7Wr4Xt1Nq8Ml3Bv6Cz9Dy5Lj";

/// Response status, headers and decoded JSON body.
pub struct TestResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: Value,
}

/// Application harness backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin_token: String,
    pub user_token: String,
    pub user_id: Uuid,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_connections(1).await
    }

    /// Harness whose pool holds `connections` SQLite connections, so
    /// concurrent requests really run on separate connections.
    pub async fn with_connections(connections: u32) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir");
        let db_path = db_dir.path().join("luxemart_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.cors_allow_any_origin = true;
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;
        cfg.payment_merchant_key = MERCHANT_KEY.to_string();
        cfg.payment_merchant_salt = MERCHANT_SALT.to_string();
        cfg.frontend_url = FRONTEND_URL.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));

        let admin = insert_user(&state, "Store Admin", "admin@luxemart.test", UserRole::Admin).await;
        let customer = insert_user(&state, "Asha Rao", "asha@example.com", UserRole::User).await;
        let admin_token = state.auth.issue_token(&admin).expect("admin token").token;
        let user_token = state.auth.issue_token(&customer).expect("user token").token;

        Self {
            router: luxemart_api::app_router(state.clone()),
            state,
            admin_token,
            user_token,
            user_id: customer.id,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Inserts another USER account and returns a token for it.
    pub async fn add_customer(&self, name: &str, email: &str) -> String {
        let account = insert_user(&self.state, name, email, UserRole::User).await;
        self.state
            .auth
            .issue_token(&account)
            .expect("customer token")
            .token
    }

    /// Forces an order into `status`, bypassing the transition rules.
    pub async fn force_status(&self, txn_id: &str, status: OrderStatus) {
        let mut active: order::ActiveModel = self.order_by_txn(txn_id).await.into();
        active.status = Set(status);
        active.update(&*self.state.db).await.expect("force status");
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Sends a JSON request through the full middleware stack.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        send(self.router(), request).await
    }

    /// Posts url-encoded fields, the way the gateway does.
    pub async fn post_form(&self, uri: &str, fields: &[(String, String)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("request");
        send(self.router(), request).await
    }

    pub async fn create_product(&self, name: &str, price: Decimal, stock: i32) -> Uuid {
        self.state
            .services
            .catalog
            .create_product(CreateProductRequest {
                name: name.to_string(),
                description: format!("{name} for tests"),
                price,
                stock,
                category: "Electronics".to_string(),
                image_url: "https://img.test/primary.jpg".to_string(),
                images: None,
            })
            .await
            .expect("create product")
            .id
    }

    /// Places a single-line order through the API with the matching total.
    pub async fn place_order(
        &self,
        token: &str,
        product_id: Uuid,
        quantity: i32,
        price: Decimal,
        txn_id: Option<&str>,
    ) -> TestResponse {
        let totals = self.state.services.orders.quote(&[
            luxemart_api::services::orders::OrderLineRequest {
                product_id,
                quantity,
                price,
            },
        ])
        .expect("quote");
        let mut body = serde_json::json!({
            "items": [{ "productId": product_id, "quantity": quantity, "price": price.to_string() }],
            "totalAmount": totals.total.to_string(),
            "shippingAddress": "12 MG Road, Pune - 411001, Phone: 9999999999",
        });
        if let Some(txn_id) = txn_id {
            body["txnId"] = Value::String(txn_id.to_string());
        }
        self.request(Method::POST, "/api/v1/orders", Some(token), Some(body))
            .await
    }

    pub async fn product_stock(&self, id: Uuid) -> i32 {
        product::Entity::find_by_id(id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }

    pub async fn order_by_txn(&self, txn_id: &str) -> order::Model {
        order::Entity::find()
            .filter(order::Column::TxnId.eq(txn_id))
            .one(&*self.state.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn order_status(&self, txn_id: &str) -> OrderStatus {
        self.order_by_txn(txn_id).await.status
    }

    pub async fn payment_count(&self, txn_id: &str) -> u64 {
        payment::Entity::find()
            .filter(payment::Column::TxnId.eq(txn_id))
            .count(&*self.state.db)
            .await
            .expect("count payments")
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count orders")
    }
}

async fn insert_user(state: &AppState, name: &str, email: &str, role: UserRole) -> user::Model {
    let now = Utc::now();
    user::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        // Never used to sign in; tests authenticate with issued tokens.
        password_hash: Set("$argon2id$unused".to_string()),
        role: Set(role),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*state.db)
    .await
    .expect("insert user")
}

async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.expect("router response");
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    TestResponse {
        status,
        location,
        body,
    }
}

/// Callback form the gateway would post, signed with the test merchant salt.
pub fn signed_callback(
    txn_id: &str,
    amount: &str,
    status: &str,
    first_name: &str,
    email: &str,
) -> Vec<(String, String)> {
    let product_info = "LuxeMart Order";
    let hash = compute_callback_signature(
        MERCHANT_SALT,
        status,
        email,
        first_name,
        product_info,
        amount,
        txn_id,
        MERCHANT_KEY,
    );
    [
        ("key", MERCHANT_KEY),
        ("txnid", txn_id),
        ("amount", amount),
        ("productinfo", product_info),
        ("firstname", first_name),
        ("email", email),
        ("status", status),
        ("mihpayid", "403993715521937565"),
        ("hash", hash.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Reads a money field that may be serialized as a string or a number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

pub fn amount_string(value: &Value) -> String {
    format_amount(decimal(value))
}
