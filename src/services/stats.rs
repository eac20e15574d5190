use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::user::Entity as UserEntity,
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Dashboard counters for administrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_users: u64,
    pub total_orders: u64,
    /// Sum of PAID, SHIPPED and DELIVERED order totals
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
}

#[derive(Clone)]
pub struct StatsService {
    db_pool: Arc<DbPool>,
}

impl StatsService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn store_stats(&self) -> Result<StoreStats, ServiceError> {
        let db = &*self.db_pool;
        let total_users = UserEntity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let total_orders = OrderEntity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        // Summed in Rust: SQLite's SUM() is floating point.
        let settled = [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered];
        let totals: Vec<Decimal> = OrderEntity::find()
            .select_only()
            .column(order::Column::TotalAmount)
            .filter(order::Column::Status.is_in(settled))
            .into_tuple()
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(StoreStats {
            total_users,
            total_orders,
            total_revenue: totals.into_iter().sum(),
        })
    }
}
