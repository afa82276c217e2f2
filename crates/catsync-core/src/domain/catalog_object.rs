//! CatalogObject domain entity
//!
//! A catalog object is the unit the engine writes: an identifier, a type
//! tag, the optimistic-concurrency version and an opaque payload of
//! type-specific fields. The engine never interprets the payload beyond
//! shallow, key-level merging.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;
use super::newtypes::{ObjectId, ObjectType};

/// Opaque type-specific fields of a catalog object
pub type Payload = Map<String, Value>;

/// A single object in a merchant's catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogObject {
    /// Stable server ID or client placeholder
    id: ObjectId,
    /// Type tag (ITEM, CATEGORY, ...)
    #[serde(rename = "type")]
    object_type: ObjectType,
    /// Concurrency token; `None` for objects never written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    /// Last modification time as reported by the catalog service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    /// Type-specific fields (name, description, category_id, image_ids, ...)
    #[serde(default)]
    payload: Payload,
}

impl CatalogObject {
    /// Creates a new, unversioned catalog object with an empty payload
    pub fn new(id: ObjectId, object_type: ObjectType) -> Self {
        Self {
            id,
            object_type,
            version: None,
            updated_at: None,
            payload: Payload::new(),
        }
    }

    /// Creates an object for a not-yet-existing entity with a fresh placeholder ID
    pub fn new_placeholder(object_type: ObjectType) -> Self {
        Self::new(ObjectId::placeholder(), object_type)
    }

    /// Sets the version (builder style)
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the service-reported modification time (builder style)
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    /// Sets a single payload field (builder style)
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Replaces the payload (builder style)
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Returns a payload field by key
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// True if the object has never been written (placeholder ID)
    pub fn is_new(&self) -> bool {
        self.id.is_placeholder()
    }

    /// Replaces the object ID (used when a placeholder is mapped to a server ID)
    pub fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    /// Sets or clears the concurrency token
    pub fn set_version(&mut self, version: Option<i64>) {
        self.version = version;
    }

    pub fn set_updated_at(&mut self, updated_at: Option<DateTime<Utc>>) {
        self.updated_at = updated_at;
    }

    /// Mutable access to the payload
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Validates the invariants the engine relies on before writing
    ///
    /// - versions are non-negative
    /// - placeholder objects carry no version (they have never been written)
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Some(version) = self.version {
            if version < 0 {
                return Err(DomainError::InvalidVersion(version));
            }
            if self.id.is_placeholder() {
                return Err(DomainError::ValidationFailed(format!(
                    "placeholder object {} must not carry a version",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// Validates a batch of desired objects: each object individually and
/// uniqueness of IDs across the batch
pub fn validate_unique(objects: &[CatalogObject]) -> Result<(), DomainError> {
    let mut seen = HashSet::with_capacity(objects.len());
    for object in objects {
        object.validate()?;
        if !seen.insert(object.id()) {
            return Err(DomainError::DuplicateObjectId(object.id().to_string()));
        }
    }
    Ok(())
}
