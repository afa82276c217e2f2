//! JSON wire format of the catalog API
//!
//! Catalog objects travel as
//!
//! ```json
//! {
//!   "type": "ITEM",
//!   "id": "W62UWFY35CWMYGVWK6TWJDNI",
//!   "version": 1706000000000,
//!   "updated_at": "2024-01-23T09:00:00.000Z",
//!   "item_data": { "name": "Mug" }
//! }
//! ```
//!
//! The type-specific block (`item_data`, `category_data`, ...) is the
//! object's payload. Other top-level attributes are not modelled and are
//! dropped on decode.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use catsync_core::domain::{CatalogObject, ObjectId, ObjectType};
use catsync_core::ports::{CatalogError, ErrorCode, IdMapping, RemoteErrorDetail};

// ============================================================================
// Objects
// ============================================================================

/// A catalog object as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// `<type>_data` plus any other attributes
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Encodes a domain object for a request body
pub fn encode_object(object: &CatalogObject) -> WireObject {
    let mut attributes = Map::new();
    attributes.insert(
        object.object_type().data_field(),
        Value::Object(object.payload().clone()),
    );
    WireObject {
        object_type: object.object_type().as_wire().to_string(),
        id: object.id().to_string(),
        version: object.version(),
        updated_at: object.updated_at(),
        attributes,
    }
}

/// Decodes an object from a response body
pub fn decode_object(mut wire: WireObject) -> Result<CatalogObject, CatalogError> {
    let object_type = ObjectType::from_str(&wire.object_type)
        .map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;
    let id = ObjectId::new(wire.id).map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;

    let payload = match wire.attributes.remove(&object_type.data_field()) {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(CatalogError::InvalidResponse(format!(
                "{} of object {} is not an object: {}",
                object_type.data_field(),
                id,
                other
            )))
        }
        None => Map::new(),
    };

    let mut object = CatalogObject::new(id, object_type).with_payload(payload);
    object.set_version(wire.version);
    object.set_updated_at(wire.updated_at);
    Ok(object)
}

pub fn decode_objects(objects: Vec<WireObject>) -> Result<Vec<CatalogObject>, CatalogError> {
    objects.into_iter().map(decode_object).collect()
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UpsertBatch {
    pub objects: Vec<WireObject>,
}

#[derive(Debug, Serialize)]
pub struct BatchUpsertRequest {
    pub idempotency_key: String,
    pub batches: Vec<UpsertBatch>,
}

#[derive(Debug, Serialize)]
pub struct BatchRetrieveRequest<'a> {
    pub object_ids: &'a [ObjectId],
}

// ============================================================================
// Response bodies
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct BatchUpsertResponse {
    #[serde(default)]
    pub objects: Vec<WireObject>,
    #[serde(default)]
    pub id_mappings: Vec<IdMapping>,
    #[serde(default)]
    pub errors: Vec<WireError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchRetrieveResponse {
    #[serde(default)]
    pub objects: Vec<WireObject>,
    #[serde(default)]
    pub errors: Vec<WireError>,
}

/// Body of a non-2xx response
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<WireError>,
}

/// One entry of the service's `errors` list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl WireError {
    /// Converts to a domain error detail
    ///
    /// `request_ids` are the object IDs of the request in body order; an
    /// error whose `field` points at `objects[N]` is attributed to the Nth
    /// object.
    pub fn into_detail(self, request_ids: &[ObjectId]) -> RemoteErrorDetail {
        let object_id = self
            .field
            .as_deref()
            .and_then(object_index)
            .and_then(|i| request_ids.get(i))
            .cloned();
        RemoteErrorDetail {
            category: self.category,
            code: ErrorCode::from_wire(&self.code),
            detail: self.detail,
            field: self.field,
            object_id,
        }
    }
}

/// Extracts `N` from a field path like `batches[0].objects[N].item_data.name`
fn object_index(field: &str) -> Option<usize> {
    const MARKER: &str = "objects[";
    let start = field.find(MARKER)? + MARKER.len();
    let end = field[start..].find(']')? + start;
    field[start..end].parse().ok()
}
