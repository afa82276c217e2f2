//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for catalog identifiers.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

/// Prefix the catalog service uses to recognise client-assigned placeholder IDs
pub const PLACEHOLDER_PREFIX: char = '#';

// ============================================================================
// ObjectId
// ============================================================================

/// Identifier of a catalog object
///
/// Either a stable server-assigned ID (e.g. `"W62UWFY35CWMYGVWK6TWJDNI"`) or a
/// client placeholder for an object that has not been created yet
/// (e.g. `"#new-tshirt"`). Placeholders are replaced by server IDs once the
/// create succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Creates a new ObjectId, rejecting empty or whitespace-only values
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidObjectId(id));
        }
        if id == PLACEHOLDER_PREFIX.to_string() {
            return Err(DomainError::InvalidObjectId(
                "placeholder ID needs a name after '#'".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generates a fresh, unique placeholder ID (`#<uuid>`)
    #[must_use]
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4().simple()))
    }

    /// Returns true if this is a client-assigned placeholder
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }

    /// Returns true if this ID was assigned by the catalog service
    pub fn is_stable(&self) -> bool {
        !self.is_placeholder()
    }

    /// Returns the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

// ============================================================================
// TenantId
// ============================================================================

/// Identifier of a merchant account on the catalog service
///
/// Rate limits, performance profiles and credentials are all tracked
/// per tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Creates a new TenantId, rejecting empty values and embedded whitespace
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidTenantId(id));
        }
        Ok(Self(id))
    }

    /// Returns the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

// ============================================================================
// ObjectType
// ============================================================================

/// Type tag of a catalog object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Item,
    ItemVariation,
    Category,
    Image,
    ModifierList,
    Tax,
    Discount,
}

impl ObjectType {
    /// Wire tag as used by the catalog service (e.g. `ITEM_VARIATION`)
    pub fn as_wire(&self) -> &'static str {
        match self {
            ObjectType::Item => "ITEM",
            ObjectType::ItemVariation => "ITEM_VARIATION",
            ObjectType::Category => "CATEGORY",
            ObjectType::Image => "IMAGE",
            ObjectType::ModifierList => "MODIFIER_LIST",
            ObjectType::Tax => "TAX",
            ObjectType::Discount => "DISCOUNT",
        }
    }

    /// Name of the JSON field holding the type-specific payload
    /// (e.g. `item_variation_data`)
    pub fn data_field(&self) -> String {
        format!("{}_data", self.as_wire().to_ascii_lowercase())
    }
}

impl Display for ObjectType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

impl FromStr for ObjectType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ITEM" => Ok(ObjectType::Item),
            "ITEM_VARIATION" => Ok(ObjectType::ItemVariation),
            "CATEGORY" => Ok(ObjectType::Category),
            "IMAGE" => Ok(ObjectType::Image),
            "MODIFIER_LIST" => Ok(ObjectType::ModifierList),
            "TAX" => Ok(ObjectType::Tax),
            "DISCOUNT" => Ok(ObjectType::Discount),
            other => Err(DomainError::UnknownObjectType(other.to_string())),
        }
    }
}
