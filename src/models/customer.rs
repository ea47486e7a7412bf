use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::common::{
    Address, ExternalIds, DEFAULT_CURRENCY, DEFAULT_PAYMENT_TERMS_DAYS,
};
use crate::models::validation::{validate_cvr, validate_danish_vat};

/// Vendor-neutral customer (debtor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Customer {
    pub id: Uuid,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub customer_number: Option<String>,
    #[validate(length(min = 1, message = "Customer name required"))]
    pub name: String,
    #[validate(custom(function = validate_cvr))]
    pub cvr: Option<String>,
    #[validate(custom(function = validate_danish_vat))]
    pub vat_number: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Address,
    pub payment_terms_days: i32,
    pub currency: String,
    pub is_active: bool,
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_ids: ExternalIds::new(),
            customer_number: None,
            name: name.into(),
            cvr: None,
            vat_number: None,
            email: None,
            phone: None,
            address: Address::default(),
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            currency: DEFAULT_CURRENCY.to_string(),
            is_active: true,
        }
    }
}
