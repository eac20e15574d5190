use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LuxeMart API",
        version = "1.0.0",
        description = r#"
# LuxeMart Storefront API

Catalog browsing, checkout through a hosted payment page, and order
fulfilment for administrators.

## Checkout

1. `POST /api/v1/orders` reserves stock and records a `PENDING` order.
2. `GET /api/v1/payments/checkout/{txn_id}` returns the form the browser
   posts to the gateway.
3. The gateway posts the result to `/api/v1/payments/callback` (browser) or
   `/api/v1/payments/webhook` (server to server). The checksum is verified
   and the order moves to `PAID` or `FAILED` exactly once.

## Authentication

Customer and admin endpoints take a bearer token from `/api/v1/auth/login`:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Errors share one body:

```json
{
  "error": "Not Found",
  "message": "Product 7f1d... not found",
  "details": null,
  "request_id": "5c0b...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development")
    ),
    tags(
        (name = "Auth", description = "Accounts and tokens"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Orders", description = "Order ledger endpoints"),
        (name = "Payments", description = "Hosted checkout and gateway callbacks"),
        (name = "Admin", description = "Administrative endpoints")
    ),
    paths(
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::me,

        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,

        crate::handlers::payments::create_signature,
        crate::handlers::payments::checkout_form,
        crate::handlers::payments::payment_callback,
        crate::handlers::payments::payment_webhook,

        crate::handlers::stats::store_stats,
    ),
    components(
        schemas(
            crate::services::users::RegisterRequest,
            crate::services::users::LoginRequest,
            crate::services::users::UserResponse,
            crate::services::users::AuthResponse,
            crate::entities::UserRole,

            crate::services::catalog::CreateProductRequest,
            crate::services::catalog::UpdateProductRequest,
            crate::services::catalog::ProductResponse,

            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderLineRequest,
            crate::services::orders::UpdateOrderStatusRequest,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::CustomerSummary,
            crate::entities::OrderStatus,

            crate::services::payments::SignatureRequest,
            crate::services::payments::SignatureResponse,
            crate::services::payments::CheckoutForm,
            crate::services::payments::CheckoutField,
            crate::services::payments::CallbackOutcome,
            crate::services::payments::CallbackDisposition,

            crate::services::stats::StoreStats,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
