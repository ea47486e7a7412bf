// Billy <-> canonical mapping
// Billy reports net amount and tax; the gross total is their sum.

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

const VENDOR: ConnectorType = ConnectorType::Billy;

pub fn invoice_status(state: &str) -> InvoiceStatus {
    match state {
        "approved" => InvoiceStatus::Sent,
        "paid" => InvoiceStatus::Paid,
        "overdue" => InvoiceStatus::Overdue,
        _ => InvoiceStatus::Draft,
    }
}

pub fn customer_to_canonical(billy: &Value) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, id_field(billy, &["id"])),
        customer_number: None,
        name: str_field(billy, &["name"]).unwrap_or_default(),
        cvr: str_field(billy, &["registrationNo"]),
        vat_number: None,
        email: str_field(billy, &["email"]),
        phone: str_field(billy, &["phone"]),
        address: Address {
            street: str_field(billy, &["street"]),
            city: str_field(billy, &["cityText"]),
            zip: str_field(billy, &["zipcodeText"]),
            country: str_field(billy, &["countryId"]).or_else(|| Some(DEFAULT_COUNTRY.to_string())),
        },
        payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
        currency: DEFAULT_CURRENCY.to_string(),
        is_active: true,
    }
}

pub fn customer_from_canonical(customer: &Customer) -> Value {
    without_nulls(json!({
        "name": customer.name,
        "registrationNo": opt_str_to_json(customer.cvr.as_deref()),
        "email": opt_str_to_json(customer.email.as_deref()),
        "phone": opt_str_to_json(customer.phone.as_deref()),
        "street": opt_str_to_json(customer.address.street.as_deref()),
        "cityText": opt_str_to_json(customer.address.city.as_deref()),
        "zipcodeText": opt_str_to_json(customer.address.zip.as_deref()),
        "countryId": customer.address.country.as_deref().unwrap_or(DEFAULT_COUNTRY),
        "isCustomer": true,
    }))
}

fn invoice_line_to_canonical(line: &Value) -> InvoiceLine {
    InvoiceLine {
        product_id: id_field(line, &["productId"]),
        description: str_field(line, &["description"]).unwrap_or_default(),
        quantity: decimal_field(line, &["quantity"]).unwrap_or(Decimal::ONE),
        unit_price: decimal_field(line, &["unitPrice"]).unwrap_or(Decimal::ZERO),
        vat_rate: DEFAULT_VAT_RATE,
        discount_percent: decimal_field(line, &["discountValue"]).unwrap_or(Decimal::ZERO),
    }
}

pub fn invoice_to_canonical(billy: &Value) -> Invoice {
    let net = decimal_field(billy, &["amount"]).unwrap_or(Decimal::ZERO);
    let tax = decimal_field(billy, &["tax"]).unwrap_or(Decimal::ZERO);

    Invoice {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, id_field(billy, &["id"])),
        invoice_number: id_field(billy, &["invoiceNo"]),
        status: invoice_status(billy.get("state").and_then(Value::as_str).unwrap_or_default()),
        issue_date: date_field(billy, &["entryDate"]),
        due_date: date_field(billy, &["dueDate"]),
        customer_id: id_field(billy, &["contactId"]),
        customer_name: None,
        currency: str_field(billy, &["currencyId"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        total_ex_vat: net,
        total_vat: tax,
        total_inc_vat: net + tax,
        amount_due: decimal_field(billy, &["balance"]),
        reference: str_field(billy, &["contactMessage"]),
        notes: None,
        lines: array_field(billy, &["lines"])
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
                "productId": opt_str_to_json(line.product_id.as_deref()),
                "description": line.description,
                "quantity": decimal_to_json(line.quantity),
                "unitPrice": decimal_to_json(line.unit_price),
            }))
        })
        .collect();

    without_nulls(json!({
        "contactId": opt_str_to_json(invoice.customer_id.as_deref()),
        "entryDate": date_to_json(invoice.issue_date),
        "currencyId": invoice.currency,
        "paymentTermsDays": DEFAULT_PAYMENT_TERMS_DAYS,
        "contactMessage": opt_str_to_json(invoice.reference.as_deref()),
        "lines": lines,
    }))
}

pub fn product_to_canonical(billy: &Value) -> Product {
    Product {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, id_field(billy, &["id"])),
        product_number: str_field(billy, &["productNo"]),
        name: str_field(billy, &["name"]).unwrap_or_default(),
        description: str_field(billy, &["description"]),
        unit_price: billy
            .get("prices")
            .and_then(Value::as_array)
            .and_then(|prices| prices.first())
            .and_then(|price| decimal_field(price, &["unitPrice"]))
            .unwrap_or(Decimal::ZERO),
        cost_price: None,
        unit: DEFAULT_UNIT.to_string(),
        is_active: !billy
            .get("isArchived")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}
