//! JSON Schema helpers for MCP-compliant schemas.
//!
//! schemars renders unsigned Rust integers with formats like `"uint16"` or
//! `"uint64"` that most MCP clients do not understand. Ports, percentages and
//! byte counts are therefore described as plain non-negative integers.

use schemars::Schema;
use schemars::json_schema;

/// Unsigned integer schema: `{"type": "integer", "minimum": 0}`
///
/// Use with `#[schemars(schema_with = "crate::hub::schema::uint")]` on unsigned fields.
pub fn uint(_generator: &mut schemars::SchemaGenerator) -> Schema {
    json_schema!({
        "type": "integer",
        "minimum": 0
    })
}

/// Nullable variant of [`uint`] for `Option<u32>` and friends.
pub fn optional_uint(_generator: &mut schemars::SchemaGenerator) -> Schema {
    json_schema!({
        "type": ["integer", "null"],
        "minimum": 0
    })
}
