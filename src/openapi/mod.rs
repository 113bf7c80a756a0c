use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Order, catalog and inventory backend for a custom merchandise storefront.

## Authentication

Customer endpoints are public. Admin endpoints expect the shared admin key:

```
X-Admin-Key: <key>
```

`Authorization: Bearer <key>` is accepted as well.

## Errors

Failures use a consistent body:

```json
{
  "error": "Conflict",
  "message": "Insufficient stock. Available: 1, Requested: 2",
  "request_id": "…",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "products", description = "Catalog endpoints"),
        (name = "inventory", description = "Stock management"),
        (name = "orders", description = "Order placement, tracking and lifecycle"),
        (name = "admin", description = "Administrative endpoints")
    ),
    paths(
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::create_variant,
        crate::handlers::products::set_variant_stock,
        crate::handlers::products::product_stats,

        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::record_payment_screenshot,
        crate::handlers::orders::download_invoice,

        crate::handlers::admin::login,
    ),
    components(
        schemas(
            crate::errors::ErrorResponse,
            crate::entities::OrderStatus,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "AdminKey",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    crate::auth::ADMIN_KEY_HEADER,
                ))),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_storefront_paths() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/orders/{id}/status"));
        assert!(json.contains("/api/v1/product-stats"));
        assert!(json.contains("AdminKey"));
    }
}
