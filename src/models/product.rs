use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::common::{ExternalIds, DEFAULT_UNIT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Product {
    pub id: Uuid,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub product_number: Option<String>,
    #[validate(length(min = 1, message = "Product name required"))]
    pub name: String,
    pub description: Option<String>,
    pub unit_price: Decimal,
    pub cost_price: Option<Decimal>,
    pub unit: String,
    pub is_active: bool,
}

impl Product {
    pub fn new(name: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_ids: ExternalIds::new(),
            product_number: None,
            name: name.into(),
            description: None,
            unit_price,
            cost_price: None,
            unit: DEFAULT_UNIT.to_string(),
            is_active: true,
        }
    }
}
