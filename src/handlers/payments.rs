use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use tracing::warn;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::payments::{
        CallbackOutcome, CheckoutForm, CheckoutParams, SignatureRequest, SignatureResponse,
    },
    ApiResponse, ApiResult, AppState,
};

/// Sign a payment request for the hosted checkout page
#[utoipa::path(
    post,
    path = "/api/v1/payments/signature",
    request_body = SignatureRequest,
    responses(
        (status = 200, description = "Request checksum", body = ApiResponse<SignatureResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_signature(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<SignatureRequest>,
) -> ApiResult<SignatureResponse> {
    let signed = state.services.payments.sign_request(&payload)?;
    Ok(Json(ApiResponse::success(signed)))
}

/// Hidden form fields for a pending order, ready to post to the gateway
#[utoipa::path(
    get,
    path = "/api/v1/payments/checkout/{txn_id}",
    params(
        ("txn_id" = String, Path, description = "Order transaction id"),
        CheckoutParams
    ),
    responses(
        (status = 200, description = "Checkout form", body = ApiResponse<CheckoutForm>),
        (status = 400, description = "Order is not pending", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn checkout_form(
    State(state): State<AppState>,
    user: AuthUser,
    Path(txn_id): Path<String>,
    Query(params): Query<CheckoutParams>,
) -> ApiResult<CheckoutForm> {
    let form = state
        .services
        .payments
        .checkout_form(&user, &txn_id, params.phone)
        .await?;
    Ok(Json(ApiResponse::success(form)))
}

/// Browser return from the gateway (`surl`/`furl`)
#[utoipa::path(
    post,
    path = "/api/v1/payments/callback",
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to the storefront result page"),
        (status = 400, description = "Rejected callback", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown transaction", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Form(form): Form<BTreeMap<String, String>>,
) -> Result<Response, ServiceError> {
    let txn_id = form.get("txnid").cloned().unwrap_or_default();
    match state.services.payments.handle_callback(form).await {
        Ok(outcome) => {
            let location = state.services.payments.redirect_location(&outcome);
            Ok(Redirect::to(&location).into_response())
        }
        Err(err) => {
            warn!(txn_id = %txn_id, error = %err, "payment callback rejected");
            Err(err)
        }
    }
}

/// Server-to-server notification from the gateway
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Callback acknowledged", body = ApiResponse<CallbackOutcome>),
        (status = 400, description = "Rejected callback", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown transaction", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Form(form): Form<BTreeMap<String, String>>,
) -> ApiResult<CallbackOutcome> {
    let outcome = state.services.payments.handle_callback(form).await?;
    Ok(Json(ApiResponse::with_message(outcome, "ok")))
}
