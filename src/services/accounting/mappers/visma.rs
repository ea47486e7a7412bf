// Visma.net <-> canonical mapping
// Dates arrive wrapped as { "value": ... }; gross = amount + vatTotal.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    array_field, date_field, decimal_field, decimal_to_json, id_field, opt_str_to_json,
    str_field, without_nulls,
};
use crate::models::common::{
    external_ids_for, DEFAULT_COUNTRY, DEFAULT_CURRENCY, DEFAULT_PAYMENT_TERMS_DAYS,
};
use crate::models::invoice::DEFAULT_VAT_RATE;
use crate::models::{Address, ConnectorType, Customer, Invoice, InvoiceLine, InvoiceStatus};

const VENDOR: ConnectorType = ConnectorType::Visma;

pub fn invoice_status(status: &str) -> InvoiceStatus {
    match status {
        "Open" => InvoiceStatus::Sent,
        "Balanced" => InvoiceStatus::Paid,
        "Overdue" => InvoiceStatus::Overdue,
        _ => InvoiceStatus::Draft,
    }
}

fn date_string(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn wrapped(value: Option<String>) -> Value {
    match value {
        Some(v) => json!({ "value": v }),
        None => Value::Null,
    }
}

pub fn customer_to_canonical(visma: &Value) -> Customer {
    let number = id_field(visma, &["number"]);
    let vendor_id = number.clone().or_else(|| id_field(visma, &["internalId"]));

    Customer {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, vendor_id),
        customer_number: number,
        name: str_field(visma, &["name"]).unwrap_or_default(),
        cvr: str_field(visma, &["corporateId"]),
        vat_number: str_field(visma, &["vatRegistrationId"]),
        email: str_field(visma, &["email"])
            .or_else(|| str_field(visma, &["mainContact", "email"])),
        phone: str_field(visma, &["phone1"])
            .or_else(|| str_field(visma, &["mainContact", "phone1"])),
        address: Address {
            street: str_field(visma, &["mainAddress", "addressLine1"]),
            city: str_field(visma, &["mainAddress", "city"]),
            zip: str_field(visma, &["mainAddress", "postalCode"]),
            country: str_field(visma, &["mainAddress", "country", "id"])
                .or_else(|| Some(DEFAULT_COUNTRY.to_string())),
        },
        payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
        currency: str_field(visma, &["currencyId"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        is_active: str_field(visma, &["status"]).map_or(true, |s| s == "Active"),
    }
}

pub fn customer_from_canonical(customer: &Customer) -> Value {
    without_nulls(json!({
        "number": opt_str_to_json(customer.customer_number.as_deref()),
        "name": customer.name,
        "corporateId": opt_str_to_json(customer.cvr.as_deref()),
        "vatRegistrationId": opt_str_to_json(customer.vat_number.as_deref()),
        "email": opt_str_to_json(customer.email.as_deref()),
        "phone1": opt_str_to_json(customer.phone.as_deref()),
        "currencyId": customer.currency,
        "mainAddress": without_nulls(json!({
            "addressLine1": opt_str_to_json(customer.address.street.as_deref()),
            "city": opt_str_to_json(customer.address.city.as_deref()),
            "postalCode": opt_str_to_json(customer.address.zip.as_deref()),
            "country": { "id": customer.address.country.as_deref().unwrap_or(DEFAULT_COUNTRY) },
        })),
    }))
}

fn invoice_line_to_canonical(line: &Value) -> InvoiceLine {
    InvoiceLine {
        product_id: id_field(line, &["inventory", "number"]),
        description: str_field(line, &["description"]).unwrap_or_default(),
        quantity: decimal_field(line, &["quantity"]).unwrap_or(Decimal::ONE),
        unit_price: decimal_field(line, &["unitPriceInCurrency"])
            .or_else(|| decimal_field(line, &["unitPrice"]))
            .unwrap_or(Decimal::ZERO),
        vat_rate: DEFAULT_VAT_RATE,
        discount_percent: decimal_field(line, &["discountPercent"]).unwrap_or(Decimal::ZERO),
    }
}

pub fn invoice_to_canonical(visma: &Value) -> Invoice {
    let reference = id_field(visma, &["referenceNumber"]);
    let vendor_id = reference.clone().or_else(|| id_field(visma, &["internalId"]));
    let net = decimal_field(visma, &["amount"]).unwrap_or(Decimal::ZERO);
    let vat = decimal_field(visma, &["vatTotal"]).unwrap_or(Decimal::ZERO);

    Invoice {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, vendor_id),
        invoice_number: reference,
        status: invoice_status(visma.get("status").and_then(Value::as_str).unwrap_or_default()),
        issue_date: date_field(visma, &["date"]),
        due_date: date_field(visma, &["dueDate"]),
        customer_id: id_field(visma, &["customer", "number"]),
        customer_name: str_field(visma, &["customer", "name"]),
        currency: str_field(visma, &["currencyId"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        total_ex_vat: net,
        total_vat: vat,
        total_inc_vat: net + vat,
        amount_due: decimal_field(visma, &["balance"]),
        reference: str_field(visma, &["externalReference"]),
        notes: None,
        lines: array_field(visma, &["invoiceLines"])
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
                "inventory": line.product_id.as_deref().map(|number| json!({ "number": number })),
                "description": line.description,
                "quantity": decimal_to_json(line.quantity),
                "unitPriceInCurrency": decimal_to_json(line.unit_price),
                "discountPercent": decimal_to_json(line.discount_percent),
            }))
        })
        .collect();

    without_nulls(json!({
        "customer": { "number": opt_str_to_json(invoice.customer_id.as_deref()) },
        "date": wrapped(date_string(invoice.issue_date)),
        "dueDate": wrapped(date_string(invoice.due_date)),
        "currencyId": invoice.currency,
        "externalReference": opt_str_to_json(invoice.reference.as_deref()),
        "invoiceLines": lines,
    }))
}
