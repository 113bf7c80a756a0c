use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use super::common::JsonBody;
use crate::{
    auth::AdminCredential,
    errors::ServiceError,
    services::{
        catalog::{
            CreateProductRequest, CreateVariantRequest, ProductResponse, ProductStats,
            UpdateProductRequest, VariantResponse,
        },
        inventory::{SetStockRequest, VariantStockResponse},
    },
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    description = "Active products with their variants. Admins also see inactive products.",
    responses(
        (status = 200, description = "Products listed", body = ApiResponse<Vec<ProductResponse>>),
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    credential: Option<AdminCredential>,
) -> ApiResult<Vec<ProductResponse>> {
    let products = state
        .services
        .catalog
        .list_products(credential.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product found", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    tag = "products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    credential: Option<AdminCredential>,
) -> ApiResult<ProductResponse> {
    let product = state
        .services
        .catalog
        .get_product(id, credential.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    credential: Option<AdminCredential>,
    body: Result<JsonBody<CreateProductRequest>, ServiceError>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    state.verifier.authorize(credential.as_ref())?;
    let JsonBody(request) = body?;
    let product = state
        .services
        .catalog
        .create_product(request, credential.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}",
    summary = "Update product",
    description = "Applies one action: toggle_active, update_stock or update_price",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    credential: Option<AdminCredential>,
    body: Result<JsonBody<UpdateProductRequest>, ServiceError>,
) -> ApiResult<ProductResponse> {
    state.verifier.authorize(credential.as_ref())?;
    let JsonBody(request) = body?;
    let product = state
        .services
        .catalog
        .update_product(id, request, credential.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    summary = "Deactivate product",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Product deactivated"),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    credential: Option<AdminCredential>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .catalog
        .delete_product(id, credential.as_ref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/variants",
    summary = "Create variant",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = CreateVariantRequest,
    responses(
        (status = 201, description = "Variant created", body = ApiResponse<VariantResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "products"
)]
pub async fn create_variant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    credential: Option<AdminCredential>,
    body: Result<JsonBody<CreateVariantRequest>, ServiceError>,
) -> Result<(StatusCode, Json<ApiResponse<VariantResponse>>), ServiceError> {
    state.verifier.authorize(credential.as_ref())?;
    let JsonBody(request) = body?;
    let variant = state
        .services
        .catalog
        .create_variant(id, request, credential.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(variant))))
}

#[utoipa::path(
    patch,
    path = "/api/v1/variants/{id}/stock",
    summary = "Set variant stock",
    params(("id" = Uuid, Path, description = "Variant ID")),
    request_body = SetStockRequest,
    responses(
        (status = 200, description = "Stock set", body = ApiResponse<VariantStockResponse>),
        (status = 400, description = "Negative stock", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "inventory"
)]
pub async fn set_variant_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    credential: Option<AdminCredential>,
    body: Result<JsonBody<SetStockRequest>, ServiceError>,
) -> ApiResult<VariantStockResponse> {
    state.verifier.authorize(credential.as_ref())?;
    let JsonBody(request) = body?;
    let stock = state
        .services
        .inventory
        .set_variant_stock(id, request, credential.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(stock)))
}

#[utoipa::path(
    get,
    path = "/api/v1/product-stats",
    summary = "Product stats",
    description = "Stock and sales per active product. Rejected orders are not counted.",
    responses(
        (status = 200, description = "Stats computed", body = ApiResponse<Vec<ProductStats>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "products"
)]
pub async fn product_stats(
    State(state): State<AppState>,
    credential: Option<AdminCredential>,
) -> ApiResult<Vec<ProductStats>> {
    let stats = state
        .services
        .catalog
        .product_stats(credential.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(stats)))
}
