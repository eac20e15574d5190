//! Business services. Handlers stay thin and call into these.

pub mod catalog;
pub mod money;
pub mod orders;
pub mod payments;
pub mod signature;
pub mod stats;
pub mod users;

use crate::{auth::AuthService, config::AppConfig, db::DbPool, events::EventSender};
use std::sync::Arc;

/// Every service the HTTP layer needs, built once at startup.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<users::UserService>,
    pub catalog: Arc<catalog::CatalogService>,
    pub orders: Arc<orders::OrderService>,
    pub payments: Arc<payments::PaymentService>,
    pub stats: Arc<stats::StatsService>,
}

impl Services {
    pub fn new(
        db: Arc<DbPool>,
        auth: Arc<AuthService>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        Self {
            users: Arc::new(users::UserService::new(
                db.clone(),
                auth,
                event_sender.clone(),
            )),
            catalog: Arc::new(catalog::CatalogService::new(
                db.clone(),
                event_sender.clone(),
            )),
            orders: Arc::new(orders::OrderService::new(
                db.clone(),
                event_sender.clone(),
                config.tax_rate(),
            )),
            payments: Arc::new(payments::PaymentService::new(
                db.clone(),
                event_sender,
                config,
            )),
            stats: Arc::new(stats::StatsService::new(db)),
        }
    }
}
