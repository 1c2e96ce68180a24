//! Persistence-facing views of a read.
//!
//! A [`MeterSnapshot`] is what a storage collaborator receives after a
//! successful read: the unified fields in wire order plus the raw frames.
//! [`render_json`] produces the flat string-only JSON record.

use crate::meter::schema::{field, FieldValue, ReadBuffer};
use crate::meter::types::Generation;
use crate::util::hex::encode_hex;
use crate::error::MeterError;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// One unified field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotField {
    pub formatted: String,
    pub native: FieldValue,
}

/// Ordered `name -> value` list, serialized as a JSON object in list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedFields<V>(pub Vec<(String, V)>);

impl<V> OrderedFields<V> {
    pub fn get(&self, name: &str) -> Option<&V> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedFields<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Everything a store needs to persist one read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub address: String,
    pub generation: Generation,
    pub fields: OrderedFields<SnapshotField>,
    /// Hex of the A frame (the only frame on v3).
    pub raw_a: String,
    /// Hex of the B frame, empty on v3.
    pub raw_b: String,
}

impl MeterSnapshot {
    pub fn new(address: &str, generation: Generation, unified: &ReadBuffer, raw_a: &[u8], raw_b: &[u8]) -> Self {
        let fields = unified
            .iter()
            .filter(|d| !d.is_internal())
            .map(|d| {
                (
                    d.name.clone(),
                    SnapshotField {
                        formatted: d.formatted.clone(),
                        native: d.native.clone(),
                    },
                )
            })
            .collect();
        MeterSnapshot {
            address: address.to_string(),
            generation,
            fields: OrderedFields(fields),
            raw_a: encode_hex(raw_a),
            raw_b: encode_hex(raw_b),
        }
    }

    pub fn to_json(&self) -> Result<String, MeterError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Renders a buffer as a flat JSON object of formatted strings.
///
/// `Meter_Address` comes first, set from `address`; reserved and checksum
/// fields are left out.
pub fn render_json(address: &str, buffer: &ReadBuffer) -> Result<String, MeterError> {
    let mut fields = vec![(field::METER_ADDRESS.to_string(), address.to_string())];
    fields.extend(
        buffer
            .public_fields()
            .filter(|(name, _)| *name != field::METER_ADDRESS)
            .map(|(name, value)| (name.to_string(), value.to_string())),
    );
    Ok(serde_json::to_string_pretty(&OrderedFields(fields))?)
}
