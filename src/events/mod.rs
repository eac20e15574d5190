use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

/// Domain events published by the services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(Uuid),
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        txn_id: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentCaptured {
        order_id: Uuid,
        txn_id: String,
        amount: Decimal,
    },
    PaymentFailed {
        order_id: Uuid,
        txn_id: String,
        provider_status: String,
    },
    /// A callback that repeated an already settled transaction.
    DuplicateCallback { txn_id: String },
    /// A callback whose signature or amount did not check out.
    PaymentIntegrityViolation { txn_id: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    /// The state change that produced the event is already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentIntegrityViolation { txn_id, reason } => {
                warn!(txn_id = %txn_id, reason = %reason, "payment integrity violation");
            }
            Event::OrderCreated {
                order_id,
                user_id,
                txn_id,
                total_amount,
            } => {
                info!(
                    order_id = %order_id,
                    user_id = %user_id,
                    txn_id = %txn_id,
                    total_amount = %total_amount,
                    "order created"
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(order_id = %order_id, from = %old_status, to = %new_status, "order status changed");
            }
            Event::PaymentCaptured {
                order_id,
                txn_id,
                amount,
            } => {
                info!(order_id = %order_id, txn_id = %txn_id, amount = %amount, "payment captured");
            }
            Event::PaymentFailed {
                order_id,
                txn_id,
                provider_status,
            } => {
                info!(order_id = %order_id, txn_id = %txn_id, provider_status = %provider_status, "payment failed");
            }
            other => info!(event = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}
