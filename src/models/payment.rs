use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::common::{ExternalIds, DEFAULT_CURRENCY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub invoice_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub payment_number: Option<String>,
    pub payment_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub allocations: Vec<PaymentAllocation>,
}

impl Payment {
    pub fn new(amount: Decimal, customer_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_ids: ExternalIds::new(),
            payment_number: None,
            payment_date: None,
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            customer_id,
            allocations: Vec::new(),
        }
    }
}
