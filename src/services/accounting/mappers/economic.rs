// e-conomic <-> canonical mapping
// Booked and draft invoices share one wire shape; the presence of
// bookedInvoiceNumber tells them apart.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    array_field, bool_field, date_field, date_to_json, decimal_field, decimal_to_json, id_field,
    opt_str_to_json, str_field, without_nulls,
};
use crate::models::common::{
    external_ids_for, DEFAULT_COUNTRY, DEFAULT_CURRENCY, DEFAULT_PAYMENT_TERMS_DAYS, DEFAULT_UNIT,
};
use crate::models::invoice::DEFAULT_VAT_RATE;
use crate::models::{
    Account, AccountType, Address, ConnectorType, Customer, Invoice, InvoiceLine, InvoiceStatus,
    JournalEntry, JournalLine, Payment, PaymentAllocation, Product, VatCode, VatType,
};

const VENDOR: ConnectorType = ConnectorType::Economic;
const DEFAULT_LAYOUT_NUMBER: i64 = 1;
const DEFAULT_GROUP_NUMBER: i64 = 1;
const DOMESTIC_VAT_ZONE: i64 = 1;

// ============================================================================
// Lookup tables
// ============================================================================

/// Days of credit to e-conomic's stock payment terms numbers.
pub fn payment_terms_number(days: i32) -> i64 {
    match days {
        d if d <= 0 => 1,
        d if d <= 7 => 2,
        d if d <= 14 => 3,
        d if d <= 30 => 4,
        _ => 5,
    }
}

pub fn unit_number(unit: &str) -> i64 {
    match unit.trim().to_lowercase().as_str() {
        "stk" | "stk." | "pcs" => 1,
        "kg" => 2,
        "l" | "liter" => 3,
        "m" | "meter" => 4,
        "time" | "timer" | "hour" | "hours" => 5,
        _ => 1,
    }
}

pub fn account_type(economic_type: &str) -> AccountType {
    match economic_type {
        "profitAndLoss" => AccountType::Revenue,
        "status" | "totalFrom" | "heading" | "headingStart" => AccountType::Asset,
        _ => AccountType::Expense,
    }
}

pub fn vat_type_for_zone(zone_name: &str) -> VatType {
    match zone_name {
        "EU" => VatType::EuGoods,
        "Abroad" => VatType::ReverseCharge,
        _ => VatType::Sales,
    }
}

/// Integer-looking vendor ids are sent as JSON numbers, anything else as-is.
fn number_or_string(id: &str) -> Value {
    id.trim()
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(id.to_string()))
}

// ============================================================================
// Customers
// ============================================================================

pub fn customer_to_canonical(economic: &Value) -> Customer {
    let customer_number = id_field(economic, &["customerNumber"]);

    Customer {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, customer_number.clone()),
        customer_number,
        name: str_field(economic, &["name"]).unwrap_or_default(),
        cvr: str_field(economic, &["corporateIdentificationNumber"]),
        vat_number: str_field(economic, &["vatNumber"]),
        email: str_field(economic, &["email"]),
        phone: str_field(economic, &["telephoneAndFaxNumber"]),
        address: Address {
            street: str_field(economic, &["address"]),
            city: str_field(economic, &["city"]),
            zip: str_field(economic, &["zip"]),
            country: str_field(economic, &["country"]).or_else(|| Some(DEFAULT_COUNTRY.to_string())),
        },
        payment_terms_days: decimal_field(economic, &["paymentTerms", "daysOfCredit"])
            .and_then(|d| d.trunc().to_i32())
            .unwrap_or(DEFAULT_PAYMENT_TERMS_DAYS),
        currency: str_field(economic, &["currency"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        is_active: !bool_field(economic, &["barred"]).unwrap_or(false),
    }
}

/// `existing` is the current vendor record on update; the customer number is
/// only sent on create.
pub fn customer_from_canonical(customer: &Customer, existing: Option<&Value>) -> Value {
    let mut payload = json!({
        "name": customer.name,
        "address": opt_str_to_json(customer.address.street.as_deref()),
        "city": opt_str_to_json(customer.address.city.as_deref()),
        "zip": opt_str_to_json(customer.address.zip.as_deref()),
        "country": customer.address.country.as_deref().unwrap_or(DEFAULT_COUNTRY),
        "email": opt_str_to_json(customer.email.as_deref()),
        "telephoneAndFaxNumber": opt_str_to_json(customer.phone.as_deref()),
        "corporateIdentificationNumber": opt_str_to_json(customer.cvr.as_deref()),
        "vatNumber": opt_str_to_json(customer.vat_number.as_deref()),
        "currency": customer.currency,
        "barred": !customer.is_active,
        "paymentTerms": { "paymentTermsNumber": payment_terms_number(customer.payment_terms_days) },
        "vatZone": { "vatZoneNumber": DOMESTIC_VAT_ZONE },
        "customerGroup": { "customerGroupNumber": DEFAULT_GROUP_NUMBER },
    });

    if existing.is_none() {
        if let Some(number) = customer.customer_number.as_deref() {
            payload["customerNumber"] = number_or_string(number);
        }
    }
    if let Some(existing) = existing {
        // Keep the vendor's own group and zone references on update.
        for key in ["customerGroup", "vatZone"] {
            if let Some(current) = existing.get(key) {
                payload[key] = current.clone();
            }
        }
    }

    without_nulls(payload)
}

// ============================================================================
// Products
// ============================================================================

pub fn product_to_canonical(economic: &Value) -> Product {
    let product_number = id_field(economic, &["productNumber"]);

    Product {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, product_number.clone()),
        product_number,
        name: str_field(economic, &["name"]).unwrap_or_default(),
        description: str_field(economic, &["description"]),
        unit_price: decimal_field(economic, &["salesPrice"]).unwrap_or(Decimal::ZERO),
        cost_price: decimal_field(economic, &["costPrice"]),
        unit: str_field(economic, &["unit", "name"]).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        is_active: !bool_field(economic, &["barred"]).unwrap_or(false),
    }
}

pub fn product_from_canonical(product: &Product) -> Value {
    without_nulls(json!({
        "productNumber": opt_str_to_json(product.product_number.as_deref()),
        "name": product.name,
        "description": product.description.as_deref().unwrap_or(""),
        "salesPrice": decimal_to_json(product.unit_price),
        "costPrice": decimal_to_json(product.cost_price.unwrap_or(Decimal::ZERO)),
        "barred": !product.is_active,
        "unit": { "unitNumber": unit_number(&product.unit) },
        "productGroup": { "productGroupNumber": DEFAULT_GROUP_NUMBER },
    }))
}

// ============================================================================
// Accounts and VAT
// ============================================================================

pub fn account_to_canonical(economic: &Value) -> Account {
    let account_number = id_field(economic, &["accountNumber"]);

    Account {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, account_number.clone()),
        account_number: account_number.unwrap_or_default(),
        name: str_field(economic, &["name"]).unwrap_or_default(),
        account_type: account_type(
            economic
                .get("accountType")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
        balance: decimal_field(economic, &["balance"]).unwrap_or(Decimal::ZERO),
        is_active: !bool_field(economic, &["barred"]).unwrap_or(false),
    }
}

pub fn vat_code_to_canonical(economic: &Value) -> VatCode {
    let code = str_field(economic, &["vatCode"]);

    VatCode {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, code.clone()),
        code: code.unwrap_or_default(),
        name: str_field(economic, &["name"]).unwrap_or_default(),
        rate: decimal_field(economic, &["ratePercentage"]).unwrap_or(Decimal::ZERO),
        vat_type: vat_type_for_zone(
            economic
                .pointer("/vatZone/name")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
        is_active: !bool_field(economic, &["barred"]).unwrap_or(false),
    }
}

// ============================================================================
// Invoices
// ============================================================================

/// Booked invoices carry no status field; it is derived from the remainder
/// and the due date relative to `as_of`.
pub fn derive_invoice_status(economic: &Value, as_of: NaiveDate) -> InvoiceStatus {
    if economic.get("bookedInvoiceNumber").map_or(true, Value::is_null) {
        return InvoiceStatus::Draft;
    }

    let remainder = decimal_field(economic, &["remainder"]);
    let gross = decimal_field(economic, &["grossAmount"]).unwrap_or(Decimal::ZERO);
    if remainder == Some(Decimal::ZERO) && gross > Decimal::ZERO {
        return InvoiceStatus::Paid;
    }

    match date_field(economic, &["dueDate"]) {
        Some(due) if due < as_of => InvoiceStatus::Overdue,
        _ => InvoiceStatus::Sent,
    }
}

fn invoice_line_to_canonical(line: &Value) -> InvoiceLine {
    InvoiceLine {
        product_id: id_field(line, &["product", "productNumber"]),
        description: str_field(line, &["description"]).unwrap_or_default(),
        quantity: decimal_field(line, &["quantity"]).unwrap_or(Decimal::ONE),
        unit_price: decimal_field(line, &["unitNetPrice"]).unwrap_or(Decimal::ZERO),
        vat_rate: DEFAULT_VAT_RATE,
        discount_percent: decimal_field(line, &["discountPercentage"]).unwrap_or(Decimal::ZERO),
    }
}

pub fn invoice_to_canonical(economic: &Value, as_of: NaiveDate) -> Invoice {
    let booked_number = id_field(economic, &["bookedInvoiceNumber"]);
    let vendor_id = booked_number
        .clone()
        .or_else(|| id_field(economic, &["draftInvoiceNumber"]));

    Invoice {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, vendor_id),
        invoice_number: booked_number,
        status: derive_invoice_status(economic, as_of),
        issue_date: date_field(economic, &["date"]),
        due_date: date_field(economic, &["dueDate"]),
        customer_id: id_field(economic, &["customer", "customerNumber"]),
        customer_name: str_field(economic, &["recipient", "name"]),
        currency: str_field(economic, &["currency"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        total_ex_vat: decimal_field(economic, &["netAmount"]).unwrap_or(Decimal::ZERO),
        total_vat: decimal_field(economic, &["vatAmount"]).unwrap_or(Decimal::ZERO),
        total_inc_vat: decimal_field(economic, &["grossAmount"]).unwrap_or(Decimal::ZERO),
        amount_due: decimal_field(economic, &["remainder"]),
        reference: str_field(economic, &["references", "other"]),
        notes: str_field(economic, &["notes", "heading"]),
        lines: array_field(economic, &["lines"])
            .iter()
            .map(invoice_line_to_canonical)
            .collect(),
    }
}

/// Draft invoice payload. `customer_number` is the e-conomic customer the
/// draft is raised against.
pub fn invoice_from_canonical(invoice: &Invoice, customer_number: &str) -> Value {
    let lines: Vec<Value> = invoice
        .lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let description = if line.description.is_empty() {
                "Vare"
            } else {
                line.description.as_str()
            };
            let mut payload = json!({
                "lineNumber": index + 1,
                "description": description,
                "quantity": decimal_to_json(line.quantity),
                "unitNetPrice": decimal_to_json(line.unit_price),
                "discountPercentage": decimal_to_json(line.discount_percent),
            });
            if let Some(product_number) = line.product_id.as_deref() {
                payload["product"] = json!({ "productNumber": product_number });
            }
            payload
        })
        .collect();

    let mut payload = json!({
        "date": date_to_json(invoice.issue_date),
        "dueDate": date_to_json(invoice.due_date),
        "currency": invoice.currency,
        "exchangeRate": 1,
        "customer": { "customerNumber": number_or_string(customer_number) },
        "layout": { "layoutNumber": DEFAULT_LAYOUT_NUMBER },
        "paymentTerms": { "paymentTermsNumber": payment_terms_number(DEFAULT_PAYMENT_TERMS_DAYS) },
        "lines": lines,
    });

    if let Some(reference) = invoice.reference.as_deref() {
        payload["references"] = json!({ "other": reference });
    }
    if let Some(notes) = invoice.notes.as_deref() {
        payload["notes"] = json!({ "heading": notes });
    }
    if let Some(name) = invoice.customer_name.as_deref() {
        payload["recipient"] = json!({
            "name": name,
            "vatZone": { "vatZoneNumber": DOMESTIC_VAT_ZONE },
        });
    }

    without_nulls(payload)
}

// ============================================================================
// Payments
// ============================================================================

pub fn payment_to_canonical(economic: &Value) -> Payment {
    let payment_number = id_field(economic, &["customerPaymentNumber"]);
    let amount = decimal_field(economic, &["amount"]).unwrap_or(Decimal::ZERO);

    let allocations = array_field(economic, &["invoices"])
        .iter()
        .filter_map(|invoice| {
            Some(PaymentAllocation {
                invoice_id: id_field(invoice, &["bookedInvoiceNumber"])?,
                amount: decimal_field(invoice, &["amount"]).unwrap_or(amount),
            })
        })
        .collect();

    Payment {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, payment_number.clone()),
        payment_number,
        payment_date: date_field(economic, &["paymentDate"]),
        amount,
        currency: str_field(economic, &["currency"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        customer_id: id_field(economic, &["customer", "customerNumber"]),
        allocations,
    }
}

pub fn payment_from_canonical(payment: &Payment, customer_number: &str) -> Value {
    let mut payload = json!({
        "paymentDate": date_to_json(payment.payment_date),
        "amount": decimal_to_json(payment.amount),
        "currency": payment.currency,
        "customer": { "customerNumber": number_or_string(customer_number) },
    });

    if !payment.allocations.is_empty() {
        payload["invoices"] = payment
            .allocations
            .iter()
            .map(|allocation| {
                json!({
                    "bookedInvoiceNumber": number_or_string(&allocation.invoice_id),
                    "amount": decimal_to_json(allocation.amount),
                })
            })
            .collect();
    }

    without_nulls(payload)
}

// ============================================================================
// Journal vouchers
// ============================================================================

/// A finance voucher posts `amount` to `account` (positive = debit).
pub fn voucher_to_canonical(economic: &Value) -> JournalEntry {
    let voucher_number = id_field(economic, &["voucherNumber"]);
    let finance_vouchers = array_field(economic, &["entries", "financeVouchers"]);

    let lines = finance_vouchers
        .iter()
        .map(|entry| {
            let amount = decimal_field(entry, &["amount"]).unwrap_or(Decimal::ZERO);
            JournalLine {
                account_number: id_field(entry, &["account", "accountNumber"]).unwrap_or_default(),
                debit: amount.max(Decimal::ZERO),
                credit: (-amount).max(Decimal::ZERO),
                description: str_field(entry, &["text"]),
            }
        })
        .collect();

    JournalEntry {
        id: Uuid::new_v4(),
        external_ids: external_ids_for(VENDOR, voucher_number.clone()),
        entry_number: voucher_number,
        journal_number: id_field(economic, &["journal", "journalNumber"]),
        entry_date: finance_vouchers
            .first()
            .and_then(|entry| date_field(entry, &["date"])),
        description: finance_vouchers
            .first()
            .and_then(|entry| str_field(entry, &["text"])),
        lines,
    }
}

pub fn voucher_from_canonical(entry: &JournalEntry) -> Value {
    let finance_vouchers: Vec<Value> = entry
        .lines
        .iter()
        .map(|line| {
            without_nulls(json!({
                "account": { "accountNumber": number_or_string(&line.account_number) },
                "amount": decimal_to_json(line.debit - line.credit),
                "date": date_to_json(entry.entry_date),
                "text": opt_str_to_json(line.description.as_deref().or(entry.description.as_deref())),
                "currency": { "code": DEFAULT_CURRENCY },
            }))
        })
        .collect();

    json!({ "entries": { "financeVouchers": finance_vouchers } })
}
