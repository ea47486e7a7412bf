use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::common::{ExternalIds, DEFAULT_CURRENCY};
use crate::models::validation::totals_balance;

pub const DEFAULT_VAT_RATE: Decimal = dec!(25);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_id: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Percentage, e.g. 25 for Danish standard VAT.
    pub vat_rate: Decimal,
    pub discount_percent: Decimal,
}

impl InvoiceLine {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            product_id: None,
            description: description.into(),
            quantity,
            unit_price,
            vat_rate: DEFAULT_VAT_RATE,
            discount_percent: Decimal::ZERO,
        }
    }

    pub fn net_amount(&self) -> Decimal {
        let gross = self.quantity * self.unit_price;
        round_money(gross - gross * self.discount_percent / dec!(100))
    }

    pub fn vat_amount(&self) -> Decimal {
        round_money(self.net_amount() * self.vat_rate / dec!(100))
    }
}

fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Vendor-neutral sales invoice. `invoice_number` stays `None` until the
/// vendor books the invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Invoice {
    pub id: Uuid,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    #[validate(length(equal = 3, message = "Currency must be an ISO 4217 code"))]
    pub currency: String,
    pub total_ex_vat: Decimal,
    pub total_vat: Decimal,
    pub total_inc_vat: Decimal,
    pub amount_due: Option<Decimal>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    pub fn new(customer_id: Option<String>, lines: Vec<InvoiceLine>) -> Self {
        let mut invoice = Self {
            id: Uuid::new_v4(),
            external_ids: ExternalIds::new(),
            invoice_number: None,
            status: InvoiceStatus::Draft,
            issue_date: None,
            due_date: None,
            customer_id,
            customer_name: None,
            currency: DEFAULT_CURRENCY.to_string(),
            total_ex_vat: Decimal::ZERO,
            total_vat: Decimal::ZERO,
            total_inc_vat: Decimal::ZERO,
            amount_due: None,
            reference: None,
            notes: None,
            lines,
        };
        invoice.recalculate_totals();
        invoice
    }

    /// Derives the three totals from the lines.
    pub fn recalculate_totals(&mut self) {
        self.total_ex_vat = self.lines.iter().map(InvoiceLine::net_amount).sum();
        self.total_vat = self.lines.iter().map(InvoiceLine::vat_amount).sum();
        self.total_inc_vat = self.total_ex_vat + self.total_vat;
    }

    pub fn has_consistent_totals(&self) -> bool {
        totals_balance(self.total_ex_vat, self.total_vat, self.total_inc_vat)
    }

    /// Structural checks plus the totals rule. Applied to every invoice a
    /// connector hands back before it reaches storage.
    pub fn validate_record(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        if !self.has_consistent_totals() {
            let mut error = ValidationError::new("totals_mismatch");
            error.message = Some(
                format!(
                    "Total incl. VAT {} does not equal {} + {}",
                    self.total_inc_vat, self.total_ex_vat, self.total_vat
                )
                .into(),
            );
            errors.add("total_inc_vat", error);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Rules for a new sales invoice about to be created in a vendor system.
    pub fn validate_for_creation(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate_record() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        if self.customer_id.as_deref().map_or(true, str::is_empty) {
            errors.add("customer_id", ValidationError::new("customer_required"));
        }
        if self.lines.is_empty() {
            errors.add("lines", ValidationError::new("at_least_one_line"));
        }
        if self.lines.iter().any(|line| line.quantity <= Decimal::ZERO) {
            errors.add("lines", ValidationError::new("positive_quantity"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_invoice() -> Invoice {
        Invoice::new(
            Some("101".to_string()),
            vec![
                InvoiceLine::new("Smørrebrød", dec!(2), dec!(100)),
                InvoiceLine::new("Øl", dec!(3), dec!(45.50)),
            ],
        )
    }

    #[test]
    fn test_totals_from_lines() {
        let invoice = sample_invoice();

        assert_eq!(invoice.total_ex_vat, dec!(336.50));
        assert_eq!(invoice.total_vat, dec!(84.13));
        assert_eq!(invoice.total_inc_vat, dec!(420.63));
        assert!(invoice.validate_record().is_ok());
    }

    #[test]
    fn test_line_discount() {
        let mut line = InvoiceLine::new("Catering", dec!(1), dec!(1000));
        line.discount_percent = dec!(10);

        assert_eq!(line.net_amount(), dec!(900));
        assert_eq!(line.vat_amount(), dec!(225));
    }

    #[test]
    fn test_inconsistent_totals_rejected() {
        let mut invoice = sample_invoice();
        invoice.total_inc_vat += dec!(1);

        let errors = invoice.validate_record().unwrap_err();
        assert!(errors.field_errors().contains_key("total_inc_vat"));
    }

    #[test]
    fn test_creation_rules() {
        let mut invoice = sample_invoice();
        assert!(invoice.validate_for_creation().is_ok());

        invoice.customer_id = None;
        assert!(invoice.validate_for_creation().is_err());

        let mut invoice = sample_invoice();
        invoice.lines[0].quantity = dec!(-1);
        invoice.recalculate_totals();
        assert!(invoice.validate_record().is_ok());
        assert!(invoice.validate_for_creation().is_err());

        let empty = Invoice::new(Some("101".to_string()), Vec::new());
        assert!(empty.validate_for_creation().is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_value(InvoiceStatus::Overdue).unwrap(), "OVERDUE");
    }
}
