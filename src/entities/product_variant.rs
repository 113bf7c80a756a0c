use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A material/shape combination of a product with its own stock counter
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_variants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    #[sea_orm(nullable)]
    pub material: Option<String>,
    #[sea_orm(nullable)]
    pub shape: Option<String>,
    /// Added to the product's base price
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub price_modifier: Decimal,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Human label such as "Acrylic / Round"; `None` when neither part is set.
    pub fn label(&self) -> Option<String> {
        variant_label(self.material.as_deref(), self.shape.as_deref())
    }
}

pub fn variant_label(material: Option<&str>, shape: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [material, shape]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" / "))
    }
}
