use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use uuid::Uuid;

use super::common::{JsonBody, QueryParams};
use crate::{
    auth::AdminCredential,
    errors::ServiceError,
    services::{
        order_status::{StatusTransitionResponse, UpdateOrderStatusRequest},
        orders::{
            CreateOrderRequest, ListOrdersQuery, OrderCreatedResponse, OrderListResponse,
            OrderView, PaymentScreenshotRequest,
        },
    },
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Places an order from the public storefront form and reserves its stock",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderCreatedResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or variant not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderCreatedResponse>>), ServiceError> {
    let created = state.services.orders.create_order(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Paginated order list joined with product and variant details, newest first",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Orders listed", body = ApiResponse<OrderListResponse>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    credential: Option<AdminCredential>,
    QueryParams(query): QueryParams<ListOrdersQuery>,
) -> ApiResult<OrderListResponse> {
    let orders = state
        .services
        .orders
        .list_orders(credential.as_ref(), query)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Track order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = ApiResponse<OrderView>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderView> {
    let order = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Change order status",
    description = "Moves the order along its lifecycle. Confirming payment issues the invoice number; rejecting releases stock.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ApiResponse<StatusTransitionResponse>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("AdminKey" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    credential: Option<AdminCredential>,
    body: Result<JsonBody<UpdateOrderStatusRequest>, ServiceError>,
) -> ApiResult<StatusTransitionResponse> {
    state.verifier.authorize(credential.as_ref())?;
    let JsonBody(request) = body?;
    let transition = state
        .services
        .order_status
        .transition(id, &request.status, credential.as_ref())
        .await?;
    Ok(Json(ApiResponse::success(transition)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-screenshot",
    summary = "Attach payment screenshot",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = PaymentScreenshotRequest,
    responses(
        (status = 200, description = "Screenshot recorded", body = ApiResponse<OrderView>),
        (status = 400, description = "Invalid URL", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Payment is no longer pending", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn record_payment_screenshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<PaymentScreenshotRequest>,
) -> ApiResult<OrderView> {
    let order = state
        .services
        .orders
        .record_payment_screenshot(id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/invoice",
    summary = "Download invoice",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Invoice PDF", content_type = "application/pdf", body = Vec<u8>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 412, description = "Payment not confirmed yet", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn download_invoice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let invoice = state.services.invoices.invoice_for_order(id).await?;
    let disposition = format!("attachment; filename=\"{}\"", invoice.filename());

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        invoice.bytes,
    )
        .into_response())
}
