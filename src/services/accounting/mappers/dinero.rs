// Dinero <-> canonical mapping (PascalCase wire format)

use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    array_field, date_field, date_to_json, decimal_field, decimal_to_json, id_field,
    opt_str_to_json, str_field, without_nulls,
};
use crate::models::common::{
    external_ids_for, DEFAULT_COUNTRY, DEFAULT_CURRENCY, DEFAULT_PAYMENT_TERMS_DAYS, DEFAULT_UNIT,
};
use crate::models::invoice::DEFAULT_VAT_RATE;
use crate::models::{
    Address, ConnectorType, Customer, Invoice, InvoiceLine, InvoiceStatus, Product,
};

const VENDOR: ConnectorType = ConnectorType::Dinero;
/// Dinero's standard revenue account for sales lines.
const DEFAULT_SALES_ACCOUNT: i64 = 1000;

pub fn invoice_status(status: &str) -> InvoiceStatus {
    match status {
        "Booked" => InvoiceStatus::Sent,
        "Paid" => InvoiceStatus::Paid,
        "Overdue" => InvoiceStatus::Overdue,
        _ => InvoiceStatus::Draft,
    }
}

pub fn customer_to_canonical(dinero: &Value) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, id_field(dinero, &["ContactGuid"])),
        customer_number: None,
        name: str_field(dinero, &["Name"]).unwrap_or_default(),
        cvr: str_field(dinero, &["VatNumber"]),
        vat_number: None,
        email: str_field(dinero, &["Email"]),
        phone: str_field(dinero, &["Phone"]),
        address: Address {
            street: str_field(dinero, &["Address"]),
            city: str_field(dinero, &["City"]),
            zip: str_field(dinero, &["ZipCode"]),
            country: str_field(dinero, &["Country"]).or_else(|| Some(DEFAULT_COUNTRY.to_string())),
        },
        payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
        currency: DEFAULT_CURRENCY.to_string(),
        is_active: true,
    }
}

pub fn customer_from_canonical(customer: &Customer) -> Value {
    without_nulls(json!({
        "Name": customer.name,
        "VatNumber": opt_str_to_json(customer.cvr.as_deref()),
        "Email": opt_str_to_json(customer.email.as_deref()),
        "Phone": opt_str_to_json(customer.phone.as_deref()),
        "Address": opt_str_to_json(customer.address.street.as_deref()),
        "City": opt_str_to_json(customer.address.city.as_deref()),
        "ZipCode": opt_str_to_json(customer.address.zip.as_deref()),
        "Country": customer.address.country.as_deref().unwrap_or(DEFAULT_COUNTRY),
        "IsPerson": false,
    }))
}

fn invoice_line_to_canonical(line: &Value) -> InvoiceLine {
    InvoiceLine {
        product_id: id_field(line, &["ProductGuid"]),
        description: str_field(line, &["Description"]).unwrap_or_default(),
        quantity: decimal_field(line, &["Quantity"]).unwrap_or(Decimal::ONE),
        unit_price: decimal_field(line, &["BaseAmountValue"]).unwrap_or(Decimal::ZERO),
        vat_rate: decimal_field(line, &["AccountVatRate"]).unwrap_or(DEFAULT_VAT_RATE),
        discount_percent: decimal_field(line, &["Discount"]).unwrap_or(Decimal::ZERO),
    }
}

pub fn invoice_to_canonical(dinero: &Value) -> Invoice {
    Invoice {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, id_field(dinero, &["Guid"])),
        invoice_number: id_field(dinero, &["Number"]),
        status: invoice_status(
            dinero
                .get("Status")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
        issue_date: date_field(dinero, &["Date"]),
        due_date: date_field(dinero, &["PaymentDate"]),
        customer_id: id_field(dinero, &["ContactGuid"]),
        customer_name: str_field(dinero, &["ContactName"]),
        currency: str_field(dinero, &["Currency"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        total_ex_vat: decimal_field(dinero, &["TotalExclVat"])
            .or_else(|| decimal_field(dinero, &["TotalExVat"]))
            .unwrap_or(Decimal::ZERO),
        total_vat: decimal_field(dinero, &["TotalVat"]).unwrap_or(Decimal::ZERO),
        total_inc_vat: decimal_field(dinero, &["TotalInclVat"])
            .or_else(|| decimal_field(dinero, &["TotalIncVat"]))
            .unwrap_or(Decimal::ZERO),
        amount_due: None,
        reference: str_field(dinero, &["ExternalReference"]),
        notes: str_field(dinero, &["Comment"]),
        lines: array_field(dinero, &["ProductLines"])
            .iter()
            .map(invoice_line_to_canonical)
            .collect(),
    }
}

pub fn invoice_from_canonical(invoice: &Invoice) -> Value {
    let lines: Vec<Value> = invoice
        .lines
        .iter()
        .map(|line| {
            without_nulls(json!({
                "ProductGuid": opt_str_to_json(line.product_id.as_deref()),
                "Description": line.description,
                "Quantity": decimal_to_json(line.quantity),
                "BaseAmountValue": decimal_to_json(line.unit_price),
                "Discount": decimal_to_json(line.discount_percent),
                "AccountNumber": DEFAULT_SALES_ACCOUNT,
                "Unit": "parts",
            }))
        })
        .collect();

    without_nulls(json!({
        "ContactGuid": opt_str_to_json(invoice.customer_id.as_deref()),
        "Date": date_to_json(invoice.issue_date),
        "PaymentConditionNumberOfDays": DEFAULT_PAYMENT_TERMS_DAYS,
        "PaymentConditionType": "Netto",
        "Currency": invoice.currency,
        "ExternalReference": opt_str_to_json(invoice.reference.as_deref()),
        "Comment": opt_str_to_json(invoice.notes.as_deref()),
        "ProductLines": lines,
    }))
}

pub fn product_to_canonical(dinero: &Value) -> Product {
    Product {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, id_field(dinero, &["ProductGuid"])),
        product_number: str_field(dinero, &["ProductNumber"]),
        name: str_field(dinero, &["Name"]).unwrap_or_default(),
        description: str_field(dinero, &["Description"]),
        unit_price: decimal_field(dinero, &["BaseAmountValue"]).unwrap_or(Decimal::ZERO),
        cost_price: None,
        unit: str_field(dinero, &["Unit"]).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        is_active: true,
    }
}
