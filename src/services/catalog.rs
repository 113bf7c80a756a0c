use crate::{
    auth::{AdminCredential, CredentialVerifier},
    db::DbPool,
    entities::{
        order, product,
        product_variant::{self, variant_label},
        OrderStatus,
    },
    errors::ServiceError,
    events::{emit, Event, EventSender},
    services::inventory::{self, StockTarget},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VariantResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub material: Option<String>,
    pub shape: Option<String>,
    /// "Material / Shape"
    pub label: Option<String>,
    pub price_modifier: Decimal,
    pub stock: i32,
}

impl From<product_variant::Model> for VariantResponse {
    fn from(v: product_variant::Model) -> Self {
        Self {
            label: v.label(),
            id: v.id,
            product_id: v.product_id,
            material: v.material,
            shape: v.shape,
            price_modifier: v.price_modifier,
            stock: v.stock,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub base_price: Decimal,
    /// Only meaningful when `variants` is empty
    pub stock: i32,
    pub is_active: bool,
    pub is_customizable: bool,
    pub customization_fee: Decimal,
    pub image_url: Option<String>,
    pub cover_image_url: Option<String>,
    pub gallery_images: Vec<String>,
    pub variants: Vec<VariantResponse>,
    pub created_at: DateTime<Utc>,
}

impl ProductResponse {
    fn from_parts(product: product::Model, variants: Vec<product_variant::Model>) -> Self {
        Self {
            gallery_images: product.gallery(),
            id: product.id,
            name: product.name,
            category: product.category,
            description: product.description,
            base_price: product.base_price,
            stock: product.stock,
            is_active: product.is_active,
            is_customizable: product.is_customizable,
            customization_fee: product.customization_fee,
            image_url: product.image_url,
            cover_image_url: product.cover_image_url,
            variants: variants.into_iter().map(VariantResponse::from).collect(),
            created_at: product.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "category is required"))]
    pub category: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom = "non_negative_decimal")]
    pub base_price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_customizable: bool,
    /// Defaults to the configured customization fee
    #[validate(custom = "non_negative_decimal")]
    pub customization_fee: Option<Decimal>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[validate(url)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub gallery_images: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Admin product edits, selected by `action`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UpdateProductRequest {
    ToggleActive,
    UpdateStock { value: i32 },
    UpdatePrice { value: Decimal },
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateVariantRequest {
    #[validate(length(min = 1, max = 100))]
    pub material: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub shape: Option<String>,
    #[serde(default)]
    pub price_modifier: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductStats {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    /// Sum of variant stock, or the product's own stock when it has no variants
    pub stock: i32,
    pub variant_count: usize,
    /// Orders that were not rejected
    pub orders_sold: i64,
    pub units_sold: i64,
}

#[derive(Debug, FromQueryResult)]
struct SoldRow {
    product_id: Uuid,
    orders: i64,
    units: Option<i64>,
}

/// Catalog store: products and their variants
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    verifier: Arc<dyn CredentialVerifier>,
    default_customization_fee: Decimal,
}

impl CatalogService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        verifier: Arc<dyn CredentialVerifier>,
        default_customization_fee: Decimal,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            verifier,
            default_customization_fee,
        }
    }

    /// Lists products with nested variants.
    ///
    /// Without a valid admin credential only active products are returned,
    /// ordered by name; admins see everything, newest first.
    #[instrument(skip(self, credential))]
    pub async fn list_products(
        &self,
        credential: Option<&AdminCredential>,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        let db = &*self.db_pool;
        let is_admin = self.verifier.is_admin(credential);

        let products = if is_admin {
            product::Entity::find()
                .order_by_desc(product::Column::CreatedAt)
                .all(db)
                .await?
        } else {
            product::Entity::find()
                .filter(product::Column::IsActive.eq(true))
                .order_by_asc(product::Column::Name)
                .all(db)
                .await?
        };

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let mut variants = self.variants_by_product(&ids).await?;

        Ok(products
            .into_iter()
            .map(|p| {
                let vs = variants.remove(&p.id).unwrap_or_default();
                ProductResponse::from_parts(p, vs)
            })
            .collect())
    }

    /// A single product; inactive products are only visible to admins.
    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    pub async fn get_product(
        &self,
        product_id: Uuid,
        credential: Option<&AdminCredential>,
    ) -> Result<ProductResponse, ServiceError> {
        let product = self.find_product(product_id).await?;
        if !product.is_active && !self.verifier.is_admin(credential) {
            return Err(ServiceError::NotFound(format!("Product {}", product_id)));
        }
        let variants = self
            .variants_by_product(&[product_id])
            .await?
            .remove(&product_id)
            .unwrap_or_default();
        Ok(ProductResponse::from_parts(product, variants))
    }

    #[instrument(skip(self, credential, request), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
        credential: Option<&AdminCredential>,
    ) -> Result<ProductResponse, ServiceError> {
        self.verifier.authorize(credential)?;
        request.validate()?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            category: Set(request.category.trim().to_string()),
            description: Set(request.description),
            base_price: Set(request.base_price),
            stock: Set(request.stock),
            is_active: Set(true),
            is_customizable: Set(request.is_customizable),
            customization_fee: Set(request
                .customization_fee
                .unwrap_or(self.default_customization_fee)),
            image_url: Set(request.image_url),
            cover_image_url: Set(request.cover_image_url),
            gallery_images: Set(serde_json::to_value(&request.gallery_images)?),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(product_id = %model.id, "Product created");
        emit(self.event_sender.as_deref(), Event::ProductCreated(model.id)).await;

        Ok(ProductResponse::from_parts(model, Vec::new()))
    }

    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        request: UpdateProductRequest,
        credential: Option<&AdminCredential>,
    ) -> Result<ProductResponse, ServiceError> {
        self.verifier.authorize(credential)?;
        let db = &*self.db_pool;
        let product = self.find_product(product_id).await?;

        match request {
            UpdateProductRequest::ToggleActive => {
                let is_active = !product.is_active;
                let mut active: product::ActiveModel = product.into();
                active.is_active = Set(is_active);
                active.updated_at = Set(Utc::now());
                active.update(db).await?;
                info!(is_active, "Product visibility toggled");
            }
            UpdateProductRequest::UpdateStock { value } => {
                inventory::set_stock(db, StockTarget::Product(product_id), value).await?;
                info!(stock = value, "Product stock set");
            }
            UpdateProductRequest::UpdatePrice { value } => {
                if value.is_sign_negative() && !value.is_zero() {
                    return Err(ServiceError::ValidationError(
                        "price must not be negative".to_string(),
                    ));
                }
                let lowest_modifier = product_variant::Entity::find()
                    .filter(product_variant::Column::ProductId.eq(product_id))
                    .all(db)
                    .await?
                    .into_iter()
                    .map(|v| v.price_modifier)
                    .min();
                if let Some(modifier) = lowest_modifier {
                    if value + modifier < Decimal::ZERO {
                        return Err(ServiceError::ValidationError(
                            "price would make a variant's unit price negative".to_string(),
                        ));
                    }
                }
                let mut active: product::ActiveModel = product.into();
                active.base_price = Set(value);
                active.updated_at = Set(Utc::now());
                active.update(db).await?;
                info!(base_price = %value, "Product price updated");
            }
        }

        emit(self.event_sender.as_deref(), Event::ProductUpdated(product_id)).await;
        self.get_product(product_id, credential).await
    }

    /// Soft delete: the product is hidden and no longer orderable
    #[instrument(skip(self, credential), fields(product_id = %product_id))]
    pub async fn delete_product(
        &self,
        product_id: Uuid,
        credential: Option<&AdminCredential>,
    ) -> Result<(), ServiceError> {
        self.verifier.authorize(credential)?;
        let product = self.find_product(product_id).await?;

        let mut active: product::ActiveModel = product.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        active.update(&*self.db_pool).await?;

        info!("Product deactivated");
        emit(
            self.event_sender.as_deref(),
            Event::ProductDeactivated(product_id),
        )
        .await;
        Ok(())
    }

    #[instrument(skip(self, credential, request), fields(product_id = %product_id))]
    pub async fn create_variant(
        &self,
        product_id: Uuid,
        request: CreateVariantRequest,
        credential: Option<&AdminCredential>,
    ) -> Result<VariantResponse, ServiceError> {
        self.verifier.authorize(credential)?;
        request.validate()?;

        let product = self.find_product(product_id).await?;
        if variant_label(request.material.as_deref(), request.shape.as_deref()).is_none() {
            return Err(ServiceError::ValidationError(
                "a variant needs a material or a shape".to_string(),
            ));
        }
        if (product.base_price + request.price_modifier).is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "price_modifier would make the unit price negative".to_string(),
            ));
        }

        let now = Utc::now();
        let variant = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            material: Set(request.material),
            shape: Set(request.shape),
            price_modifier: Set(request.price_modifier),
            stock: Set(request.stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(variant_id = %variant.id, "Variant created");
        emit(
            self.event_sender.as_deref(),
            Event::VariantCreated {
                product_id,
                variant_id: variant.id,
            },
        )
        .await;

        Ok(variant.into())
    }

    /// Stock and sales per active product, for the admin dashboard
    #[instrument(skip(self, credential))]
    pub async fn product_stats(
        &self,
        credential: Option<&AdminCredential>,
    ) -> Result<Vec<ProductStats>, ServiceError> {
        self.verifier.authorize(credential)?;
        let db = &*self.db_pool;

        let products = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_asc(product::Column::Name)
            .all(db)
            .await?;
        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let variants = self.variants_by_product(&ids).await?;

        let sold: HashMap<Uuid, SoldRow> = order::Entity::find()
            .select_only()
            .column(order::Column::ProductId)
            .column_as(Expr::col(order::Column::Id).count(), "orders")
            .column_as(Expr::col(order::Column::Quantity).sum(), "units")
            .filter(order::Column::Status.ne(OrderStatus::Rejected))
            .group_by(order::Column::ProductId)
            .into_model::<SoldRow>()
            .all(db)
            .await?
            .into_iter()
            .map(|row| (row.product_id, row))
            .collect();

        Ok(products
            .into_iter()
            .map(|p| {
                let vs = variants.get(&p.id).map(Vec::as_slice).unwrap_or(&[]);
                let stock = if vs.is_empty() {
                    p.stock
                } else {
                    vs.iter().map(|v| v.stock).sum()
                };
                let (orders_sold, units_sold) = sold
                    .get(&p.id)
                    .map(|row| (row.orders, row.units.unwrap_or(0)))
                    .unwrap_or((0, 0));
                ProductStats {
                    product_id: p.id,
                    name: p.name,
                    category: p.category,
                    stock,
                    variant_count: vs.len(),
                    orders_sold,
                    units_sold,
                }
            })
            .collect())
    }

    async fn find_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {}", product_id)))
    }

    async fn variants_by_product(
        &self,
        product_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<product_variant::Model>>, ServiceError> {
        if product_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let variants = product_variant::Entity::find()
            .filter(product_variant::Column::ProductId.is_in(product_ids.to_vec()))
            .order_by_asc(product_variant::Column::Material)
            .order_by_asc(product_variant::Column::Shape)
            .all(&*self.db_pool)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<product_variant::Model>> = HashMap::new();
        for v in variants {
            grouped.entry(v.product_id).or_default().push(v);
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn update_request_is_tagged_by_action() {
        let toggle: UpdateProductRequest =
            serde_json::from_value(serde_json::json!({"action": "toggle_active"})).unwrap();
        assert!(matches!(toggle, UpdateProductRequest::ToggleActive));

        let price: UpdateProductRequest =
            serde_json::from_value(serde_json::json!({"action": "update_price", "value": "349"}))
                .unwrap();
        assert!(matches!(price, UpdateProductRequest::UpdatePrice { value } if value == dec!(349)));

        assert!(serde_json::from_value::<UpdateProductRequest>(
            serde_json::json!({"action": "drop_table"})
        )
        .is_err());
    }

    #[test]
    fn create_product_rejects_negative_price() {
        let request: CreateProductRequest = serde_json::from_value(serde_json::json!({
            "name": "Keychain",
            "category": "keychains",
            "base_price": "-1"
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
