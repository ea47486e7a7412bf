use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::models::common::ExternalIds;
use crate::models::validation::TOTAL_TOLERANCE;

// ============================================================================
// Chart of accounts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub account_number: String,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub is_active: bool,
}

// ============================================================================
// VAT codes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VatType {
    Sales,
    Purchase,
    EuGoods,
    EuServices,
    ReverseCharge,
    Exempt,
    Zero,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatCode {
    pub id: Uuid,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub code: String,
    pub name: String,
    /// Percentage.
    pub rate: Decimal,
    pub vat_type: VatType,
    pub is_active: bool,
}

// ============================================================================
// Journal entries (vouchers)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub account_number: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub entry_number: Option<String>,
    pub journal_number: Option<String>,
    pub entry_date: Option<NaiveDate>,
    pub description: Option<String>,
    #[serde(default)]
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    pub fn total_debit(&self) -> Decimal {
        self.lines.iter().map(|line| line.debit).sum()
    }

    pub fn total_credit(&self) -> Decimal {
        self.lines.iter().map(|line| line.credit).sum()
    }

    pub fn is_balanced(&self) -> bool {
        (self.total_debit() - self.total_credit()).abs() < TOTAL_TOLERANCE
    }

    pub fn validate_balanced(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.lines.is_empty() {
            errors.add("lines", ValidationError::new("at_least_one_line"));
        }
        if !self.is_balanced() {
            let mut error = ValidationError::new("unbalanced_entry");
            error.message = Some(
                format!(
                    "Debit {} does not equal credit {}",
                    self.total_debit(),
                    self.total_credit()
                )
                .into(),
            );
            errors.add("lines", error);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
