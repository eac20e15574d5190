use crate::{
    auth::AuthUser,
    config::AppConfig,
    db::{with_transaction, DbPool},
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::payment,
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{self, outcome},
    services::money::{format_amount, parse_amount},
    services::signature::{compute_request_signature, verify_callback_signature, MerchantCredentials},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Fields every gateway callback must carry.
pub const REQUIRED_CALLBACK_FIELDS: [&str; 7] = [
    "txnid",
    "amount",
    "productinfo",
    "firstname",
    "email",
    "status",
    "hash",
];

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    #[validate(length(min = 1, max = 64))]
    pub txn_id: String,
    /// Signed exactly as given, e.g. `236.00`
    #[validate(length(min = 1, max = 32))]
    pub amount: String,
    #[validate(length(min = 1, max = 255))]
    pub product_info: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 255))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignatureResponse {
    pub signature: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CheckoutParams {
    /// Payer phone number forwarded to the gateway
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutField {
    pub name: String,
    pub value: String,
}

/// Hidden form the browser posts to the gateway's payment page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutForm {
    pub action_url: String,
    /// In the order the gateway expects them
    pub fields: Vec<CheckoutField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CallbackDisposition {
    Paid,
    Failed,
    Duplicate,
}

impl CallbackDisposition {
    fn metric_label(self) -> &'static str {
        match self {
            CallbackDisposition::Paid => outcome::PAID,
            CallbackDisposition::Failed => outcome::FAILED,
            CallbackDisposition::Duplicate => outcome::DUPLICATE,
        }
    }
}

/// Result of a verified callback.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackOutcome {
    pub disposition: CallbackDisposition,
    pub order_id: Uuid,
    pub txn_id: String,
    /// Order status after the callback was applied
    pub status: OrderStatus,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

fn field<'a>(form: &'a BTreeMap<String, String>, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or("")
}

fn first_name(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or(full_name)
}

/// Gateway integration: request signing, checkout form and callbacks.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    credentials: MerchantCredentials,
    action_url: String,
    product_info: String,
    callback_url: String,
    frontend_url: String,
}

impl PaymentService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        Self {
            db_pool,
            event_sender,
            credentials: MerchantCredentials::new(
                config.payment_merchant_key.clone(),
                config.payment_merchant_salt.clone(),
            ),
            action_url: config.payment_action_url.clone(),
            product_info: config.payment_product_info.clone(),
            callback_url: config.payment_callback_url(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
        }
    }

    fn configured_credentials(&self) -> Result<&MerchantCredentials, ServiceError> {
        if self.credentials.is_configured() {
            Ok(&self.credentials)
        } else {
            Err(ServiceError::InternalError(
                "payment merchant credentials are not configured".to_string(),
            ))
        }
    }

    /// Signs a payment request. Every field is hashed verbatim; the amount is
    /// checked against the stored order total when the callback arrives.
    #[instrument(skip(self, request), fields(txn_id = %request.txn_id))]
    pub fn sign_request(&self, request: &SignatureRequest) -> Result<SignatureResponse, ServiceError> {
        request.validate()?;
        let creds = self.configured_credentials()?;
        let signature = compute_request_signature(
            &creds.key,
            &request.txn_id,
            &request.amount,
            &request.product_info,
            &request.first_name,
            &request.email,
            &creds.salt,
        );
        Ok(SignatureResponse { signature })
    }

    /// Assembles the gateway form for a PENDING order owned by `caller`.
    #[instrument(skip(self, caller, phone), fields(user_id = %caller.user_id))]
    pub async fn checkout_form(
        &self,
        caller: &AuthUser,
        txn_id: &str,
        phone: Option<String>,
    ) -> Result<CheckoutForm, ServiceError> {
        let creds = self.configured_credentials()?;
        let order = OrderEntity::find()
            .filter(order::Column::TxnId.eq(txn_id))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|o| o.user_id == caller.user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", txn_id)))?;

        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} is already {}",
                txn_id, order.status
            )));
        }

        let phone = phone.unwrap_or_default();
        if phone.len() > 20 || !phone.chars().all(|c| c.is_ascii_digit() || c == '+') {
            return Err(ServiceError::ValidationError(
                "phone must contain only digits".to_string(),
            ));
        }

        let amount = format_amount(order.total_amount);
        let firstname = first_name(&caller.name).to_string();
        let hash = compute_request_signature(
            &creds.key,
            &order.txn_id,
            &amount,
            &self.product_info,
            &firstname,
            &caller.email,
            &creds.salt,
        );

        let fields = [
            ("key", creds.key.clone()),
            ("txnid", order.txn_id),
            ("amount", amount),
            ("productinfo", self.product_info.clone()),
            ("firstname", firstname),
            ("email", caller.email.clone()),
            ("phone", phone),
            ("surl", self.callback_url.clone()),
            ("furl", self.callback_url.clone()),
            ("hash", hash),
        ]
        .into_iter()
        .map(|(name, value)| CheckoutField {
            name: name.to_string(),
            value,
        })
        .collect();

        Ok(CheckoutForm {
            action_url: self.action_url.clone(),
            fields,
        })
    }

    async fn reject(&self, txn_id: &str, reason: &str) -> ServiceError {
        metrics::record_callback(outcome::REJECTED);
        self.event_sender
            .send_or_log(Event::PaymentIntegrityViolation {
                txn_id: txn_id.to_string(),
                reason: reason.to_string(),
            })
            .await;
        ServiceError::IntegrityViolation(format!("{} for transaction {}", reason, txn_id))
    }

    /// Verifies a gateway callback and settles the order exactly once.
    ///
    /// The signature is checked before anything is read from the database.
    /// A callback for an order that is no longer PENDING is acknowledged as a
    /// duplicate without touching any rows.
    #[instrument(skip(self, form), fields(txn_id = %field(&form, "txnid"), status = %field(&form, "status")))]
    pub async fn handle_callback(
        &self,
        form: BTreeMap<String, String>,
    ) -> Result<CallbackOutcome, ServiceError> {
        let missing: Vec<&str> = REQUIRED_CALLBACK_FIELDS
            .iter()
            .copied()
            .filter(|name| field(&form, name).is_empty())
            .collect();
        if !missing.is_empty() {
            metrics::record_callback(outcome::REJECTED);
            return Err(ServiceError::BadRequest(format!(
                "Callback is missing fields: {}",
                missing.join(", ")
            )));
        }

        let creds = self.configured_credentials()?;
        let txn_id = field(&form, "txnid").to_string();
        let provider_status = field(&form, "status").to_string();
        let raw_amount = field(&form, "amount");

        let verified = verify_callback_signature(
            &creds.salt,
            &provider_status,
            field(&form, "email"),
            field(&form, "firstname"),
            field(&form, "productinfo"),
            raw_amount,
            &txn_id,
            &creds.key,
            field(&form, "hash"),
        );
        if !verified {
            warn!(txn_id = %txn_id, "potential integrity violation: callback signature mismatch");
            metrics::record_signature_failure();
            return Err(self.reject(&txn_id, "signature mismatch").await);
        }

        let order = OrderEntity::find()
            .filter(order::Column::TxnId.eq(txn_id.as_str()))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", txn_id)))?;

        if order.status != OrderStatus::Pending {
            return Ok(self.duplicate(order).await);
        }

        let amount = parse_amount(raw_amount);
        if amount != Some(order.total_amount) {
            warn!(
                txn_id = %txn_id,
                reported = raw_amount,
                expected = %format_amount(order.total_amount),
                "potential integrity violation: callback amount differs from order total"
            );
            return Err(self.reject(&txn_id, "amount mismatch").await);
        }

        let new_status = if provider_status == "success" {
            OrderStatus::Paid
        } else {
            OrderStatus::Failed
        };
        let payload = serde_json::to_value(&form)?;
        let order_id = order.id;
        let total = order.total_amount;
        let settle_txn_id = txn_id.clone();
        let settle_status = provider_status.clone();

        let settled = with_transaction::<_, _, ServiceError>(&self.db_pool, move |txn| {
            Box::pin(async move {
                let now = Utc::now();
                let result = OrderEntity::update_many()
                    .col_expr(order::Column::Status, Expr::value(new_status))
                    .col_expr(order::Column::UpdatedAt, Expr::value(now))
                    .filter(order::Column::TxnId.eq(settle_txn_id.as_str()))
                    .filter(order::Column::Status.eq(OrderStatus::Pending))
                    .exec(txn)
                    .await?;
                if result.rows_affected == 0 {
                    return Ok::<_, ServiceError>(false);
                }

                payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    txn_id: Set(settle_txn_id),
                    amount: Set(total),
                    provider_status: Set(settle_status),
                    provider_payload: Set(payload),
                    created_at: Set(now),
                }
                .insert(txn)
                .await?;
                Ok(true)
            })
        })
        .await;

        let settled = match settled {
            Ok(settled) => settled,
            Err(ServiceError::DatabaseError(e))
                if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
            {
                false
            }
            Err(e) => return Err(e),
        };

        if !settled {
            let current = OrderEntity::find_by_id(order_id)
                .one(&*self.db_pool)
                .await
                .map_err(ServiceError::db_error)?
                .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", txn_id)))?;
            return Ok(self.duplicate(current).await);
        }

        let disposition = if new_status == OrderStatus::Paid {
            info!(order_id = %order_id, txn_id = %txn_id, amount = %total, "payment captured");
            self.event_sender
                .send_or_log(Event::PaymentCaptured {
                    order_id,
                    txn_id: txn_id.clone(),
                    amount: total,
                })
                .await;
            CallbackDisposition::Paid
        } else {
            info!(order_id = %order_id, txn_id = %txn_id, provider_status = %provider_status, "payment failed");
            self.event_sender
                .send_or_log(Event::PaymentFailed {
                    order_id,
                    txn_id: txn_id.clone(),
                    provider_status,
                })
                .await;
            CallbackDisposition::Failed
        };
        metrics::record_callback(disposition.metric_label());

        Ok(CallbackOutcome {
            disposition,
            order_id,
            txn_id,
            status: new_status,
            amount: total,
        })
    }

    async fn duplicate(&self, order: order::Model) -> CallbackOutcome {
        info!(txn_id = %order.txn_id, status = %order.status, "duplicate callback acknowledged");
        metrics::record_callback(outcome::DUPLICATE);
        self.event_sender
            .send_or_log(Event::DuplicateCallback {
                txn_id: order.txn_id.clone(),
            })
            .await;
        CallbackOutcome {
            disposition: CallbackDisposition::Duplicate,
            order_id: order.id,
            txn_id: order.txn_id,
            status: order.status,
            amount: order.total_amount,
        }
    }

    /// Where the browser lands after the gateway posts back.
    pub fn redirect_location(&self, outcome: &CallbackOutcome) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("txnid", &outcome.txn_id);
        if outcome.status.is_settled() {
            query.append_pair("amount", &format_amount(outcome.amount));
            format!("{}/#/order-success?{}", self.frontend_url, query.finish())
        } else {
            format!("{}/#/order-failure?{}", self.frontend_url, query.finish())
        }
    }

    /// Failure page for callbacks that could not be processed.
    pub fn failure_location(&self, txn_id: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("txnid", txn_id)
            .finish();
        format!("{}/#/order-failure?{}", self.frontend_url, query)
    }
}
