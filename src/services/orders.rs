use crate::{
    auth::AuthUser,
    db::{with_transaction, DbPool},
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::product::{self, Entity as ProductEntity},
    entities::user::{self, Entity as UserEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::money::{compute_totals, Totals},
};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    pub static ref TXN_ID_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("txn id pattern is valid");
}

/// `TXN` followed by twelve random digits.
pub fn generate_txn_id() -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..12)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("TXN{}", digits)
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    #[serde(alias = "id")]
    pub product_id: Uuid,
    pub quantity: i32,
    /// Unit price the client displayed; frozen onto the line item
    #[schema(value_type = String, example = "100.00")]
    pub price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<OrderLineRequest>,
    /// Must equal subtotal plus tax
    #[schema(value_type = String, example = "236.00")]
    pub total_amount: Decimal,
    #[validate(length(min = 1, max = 1000, message = "Shipping address is required"))]
    pub shipping_address: String,
    /// Generated when omitted
    #[validate(regex(
        path = "TXN_ID_REGEX",
        message = "txnId must be 1-64 letters, digits, '-' or '_'"
    ))]
    pub txn_id: Option<String>,
}

impl CreateOrderRequest {
    fn validate_lines(&self) -> Result<(), ServiceError> {
        self.validate()?;
        if self.shipping_address.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Shipping address is required".to_string(),
            ));
        }
        for line in &self.items {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for product {} must be at least 1",
                    line.product_id
                )));
            }
            if line.price.is_sign_negative() && !line.price.is_zero() {
                return Err(ServiceError::ValidationError(format!(
                    "Price for product {} must not be negative",
                    line.product_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub unit_price: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            product_name: model.product_name,
            quantity: model.quantity,
            unit_price: model.unit_price,
        }
    }
}

/// Customer details shown to administrators
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub txn_id: String,
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub tax_amount: Decimal,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub items: Vec<OrderItemResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    fn assemble(
        order: order::Model,
        items: Vec<order_item::Model>,
        customer: Option<CustomerSummary>,
    ) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            txn_id: order.txn_id,
            status: order.status,
            subtotal: order.subtotal,
            tax_amount: order.tax_amount,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            customer,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Reserves one line item's stock with a guarded decrement.
///
/// The `stock >= quantity` predicate is evaluated by the database under the
/// row lock taken by the UPDATE, so concurrent reservations of the same
/// product serialize and stock never goes negative.
async fn reserve_stock<C: ConnectionTrait>(
    conn: &C,
    line: &OrderLineRequest,
    now: DateTime<Utc>,
) -> Result<product::Model, ServiceError> {
    let result = ProductEntity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(line.quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(now))
        .filter(product::Column::Id.eq(line.product_id))
        .filter(product::Column::Stock.gte(line.quantity))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let product = ProductEntity::find_by_id(line.product_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", line.product_id)))?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "Insufficient stock for {}",
            product.name
        )));
    }
    Ok(product)
}

/// Order ledger: creation, queries and administrative status changes
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    tax_rate: Decimal,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, tax_rate: Decimal) -> Self {
        Self {
            db_pool,
            event_sender,
            tax_rate,
        }
    }

    pub fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// Totals the server charges for these lines.
    pub fn quote(&self, lines: &[OrderLineRequest]) -> Result<Totals, ServiceError> {
        compute_totals(lines.iter().map(|l| (l.price, l.quantity)), self.tax_rate).ok_or_else(
            || ServiceError::ValidationError("Order amounts are too large".to_string()),
        )
    }

    /// Creates a PENDING order and reserves stock for every line, atomically.
    #[instrument(skip(self, request), fields(user_id = %user_id, txn_id = tracing::field::Empty))]
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        let result = self.create_order_inner(user_id, request).await;
        match &result {
            Ok(order) => {
                metrics::record_order_created();
                info!(order_id = %order.id, txn_id = %order.txn_id, total = %order.total_amount, "order created");
                self.event_sender
                    .send_or_log(Event::OrderCreated {
                        order_id: order.id,
                        user_id,
                        txn_id: order.txn_id.clone(),
                        total_amount: order.total_amount,
                    })
                    .await;
            }
            Err(e) => {
                metrics::record_order_failure(e.kind());
                warn!(error = %e, "order creation failed");
            }
        }
        result
    }

    async fn create_order_inner(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate_lines()?;

        let totals = self.quote(&request.items)?;
        if totals.total != request.total_amount {
            return Err(ServiceError::ValidationError(format!(
                "Total amount {} does not match computed total {} (subtotal {} + tax {})",
                request.total_amount, totals.total, totals.subtotal, totals.tax
            )));
        }

        let txn_id = request.txn_id.clone().unwrap_or_else(generate_txn_id);
        tracing::Span::current().record("txn_id", txn_id.as_str());

        let duplicate = OrderEntity::find()
            .filter(order::Column::TxnId.eq(txn_id.as_str()))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        if duplicate.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Order with transaction id {} already exists",
                txn_id
            )));
        }

        let shipping_address = request.shipping_address.trim().to_string();
        let lines = request.items;
        let conflict_txn_id = txn_id.clone();

        let (order, items) = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let order_id = Uuid::new_v4();
                let mut snapshots = Vec::with_capacity(lines.len());

                for line in &lines {
                    let product = reserve_stock(txn, line, now).await?;
                    if product.price != line.price {
                        warn!(
                            product_id = %product.id,
                            catalog_price = %product.price,
                            client_price = %line.price,
                            "order line price differs from catalog price"
                        );
                    }
                    snapshots.push((line.clone(), product.name));
                }

                let order = order::ActiveModel {
                    id: Set(order_id),
                    user_id: Set(user_id),
                    txn_id: Set(txn_id),
                    status: Set(OrderStatus::Pending),
                    subtotal: Set(totals.subtotal),
                    tax_amount: Set(totals.tax),
                    total_amount: Set(totals.total),
                    shipping_address: Set(shipping_address),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(txn)
                .await?;

                let mut items = Vec::with_capacity(snapshots.len());
                for (line, product_name) in snapshots {
                    let item = order_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        order_id: Set(order_id),
                        product_id: Set(line.product_id),
                        product_name: Set(product_name),
                        quantity: Set(line.quantity),
                        unit_price: Set(line.price),
                    }
                    .insert(txn)
                    .await?;
                    items.push(item);
                }

                Ok::<_, ServiceError>((order, items))
            })
        })
        .await
        .map_err(|e| match e {
            ServiceError::DatabaseError(db_err)
                if matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                ServiceError::Conflict(format!(
                    "Order with transaction id {} already exists",
                    conflict_txn_id
                ))
            }
            other => other,
        })?;

        Ok(OrderResponse::assemble(order, items, None))
    }

    async fn items_by_order(
        &self,
        order_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<order_item::Model>>, ServiceError> {
        let mut grouped: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn customers(
        &self,
        user_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, CustomerSummary>, ServiceError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let users = UserEntity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(users
            .into_iter()
            .map(|u| {
                (
                    u.id,
                    CustomerSummary {
                        name: u.name,
                        email: u.email,
                    },
                )
            })
            .collect())
    }

    /// Own orders for customers, every order (with customer) for admins;
    /// newest first.
    pub async fn list_orders(&self, caller: &AuthUser) -> Result<Vec<OrderResponse>, ServiceError> {
        let mut query = OrderEntity::find();
        if !caller.is_admin() {
            query = query.filter(order::Column::UserId.eq(caller.user_id));
        }
        let orders = query
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        let mut items = self
            .items_by_order(orders.iter().map(|o| o.id).collect())
            .await?;
        let customers = if caller.is_admin() {
            self.customers(orders.iter().map(|o| o.user_id).collect())
                .await?
        } else {
            HashMap::new()
        };

        Ok(orders
            .into_iter()
            .map(|o| {
                let lines = items.remove(&o.id).unwrap_or_default();
                let customer = customers.get(&o.user_id).cloned();
                OrderResponse::assemble(o, lines, customer)
            })
            .collect())
    }

    /// One order, visible to its owner and to admins. Other callers get 404.
    pub async fn get_order(
        &self,
        caller: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|o| caller.is_admin() || o.user_id == caller.user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = self
            .items_by_order(vec![order.id])
            .await?
            .remove(&order.id)
            .unwrap_or_default();
        let customer = if caller.is_admin() {
            self.customers(vec![order.user_id])
                .await?
                .remove(&order.user_id)
        } else {
            None
        };
        Ok(OrderResponse::assemble(order, items, customer))
    }

    pub async fn find_by_txn_id(&self, txn_id: &str) -> Result<order::Model, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::TxnId.eq(txn_id))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", txn_id)))
    }

    /// Administrative fulfilment: PAID -> SHIPPED -> DELIVERED, one step at a time.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let current = OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if current.status.admin_successor() != Some(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot move order from {} to {}",
                current.status, new_status
            )));
        }

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current.status))
            .exec(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} changed status concurrently",
                order_id
            )));
        }

        info!(order_id = %order_id, from = %current.status, to = %new_status, "order status updated");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.status,
                new_status,
            })
            .await;

        OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
