use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CURRENCY: &str = "DKK";
pub const DEFAULT_COUNTRY: &str = "DK";
pub const DEFAULT_UNIT: &str = "stk";
pub const DEFAULT_PAYMENT_TERMS_DAYS: i32 = 14;

// ============================================================================
// Connector Type
// ============================================================================

/// Accounting system a record or connector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    Economic,
    Dinero,
    Billy,
    Visma,
}

impl ConnectorType {
    pub const ALL: [ConnectorType; 4] = [
        ConnectorType::Economic,
        ConnectorType::Dinero,
        ConnectorType::Billy,
        ConnectorType::Visma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::Economic => "economic",
            ConnectorType::Dinero => "dinero",
            ConnectorType::Billy => "billy",
            ConnectorType::Visma => "visma",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ConnectorType::Economic => "e-conomic",
            ConnectorType::Dinero => "Dinero",
            ConnectorType::Billy => "Billy",
            ConnectorType::Visma => "Visma.net",
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown connector type: {0}")]
pub struct UnknownConnectorType(pub String);

impl FromStr for ConnectorType {
    type Err = UnknownConnectorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "economic" | "e-conomic" => Ok(ConnectorType::Economic),
            "dinero" => Ok(ConnectorType::Dinero),
            "billy" => Ok(ConnectorType::Billy),
            "visma" | "visma.net" => Ok(ConnectorType::Visma),
            _ => Err(UnknownConnectorType(s.to_string())),
        }
    }
}

/// Vendor name to vendor-specific id. A map, so each vendor appears at most once.
pub type ExternalIds = BTreeMap<ConnectorType, String>;

/// Builds an `ExternalIds` map holding a single vendor id, or an empty map when
/// the vendor did not supply one.
pub fn external_ids_for(vendor: ConnectorType, id: Option<String>) -> ExternalIds {
    let mut ids = ExternalIds::new();
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        ids.insert(vendor, id);
    }
    ids
}

// ============================================================================
// Entity Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Customer,
    Product,
    Invoice,
    Payment,
    Account,
    VatCode,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::Product => "product",
            EntityType::Invoice => "invoice",
            EntityType::Payment => "payment",
            EntityType::Account => "account",
            EntityType::VatCode => "vat_code",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(EntityType::Customer),
            "product" => Ok(EntityType::Product),
            "invoice" => Ok(EntityType::Invoice),
            "payment" => Ok(EntityType::Payment),
            "account" => Ok(EntityType::Account),
            "vat_code" | "vatCode" => Ok(EntityType::VatCode),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

// ============================================================================
// Address
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
}

impl Default for Address {
    fn default() -> Self {
        Self {
            street: None,
            city: None,
            zip: None,
            country: Some(DEFAULT_COUNTRY.to_string()),
        }
    }
}
