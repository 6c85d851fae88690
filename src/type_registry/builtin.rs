//! Built-in type knowledge that holds regardless of the loaded schema.
//!
//! The schema document supplies resources, datatypes and their elements. This
//! module supplies the fixed part: the abstract roots, the primitive
//! specializations FHIRPath relies on (`code` is a `string`, `url` is a `uri`),
//! the System-type aliases, and how each primitive is represented in JSON.

use super::config::TypeKind;
use serde::{Deserialize, Serialize};

/// Embedded FHIR R4 core subset, loaded by `TypeRegistry::builtin()`.
pub const BUILTIN_SCHEMA: &str = include_str!("../../schemas/fhir_r4_core.yaml");

/// Types the registry always knows about, with their kind.
pub const BUILTIN_TYPES: &[(&str, TypeKind)] = &[
    ("Element", TypeKind::ComplexType),
    ("BackboneElement", TypeKind::ComplexType),
    ("Resource", TypeKind::Resource),
    ("DomainResource", TypeKind::Resource),
    ("boolean", TypeKind::PrimitiveType),
    ("integer", TypeKind::PrimitiveType),
    ("decimal", TypeKind::PrimitiveType),
    ("string", TypeKind::PrimitiveType),
    ("uri", TypeKind::PrimitiveType),
    ("date", TypeKind::PrimitiveType),
    ("dateTime", TypeKind::PrimitiveType),
    ("instant", TypeKind::PrimitiveType),
    ("time", TypeKind::PrimitiveType),
    ("base64Binary", TypeKind::PrimitiveType),
    ("code", TypeKind::PrimitiveType),
    ("id", TypeKind::PrimitiveType),
    ("markdown", TypeKind::PrimitiveType),
    ("url", TypeKind::PrimitiveType),
    ("canonical", TypeKind::PrimitiveType),
    ("oid", TypeKind::PrimitiveType),
    ("uuid", TypeKind::PrimitiveType),
    ("unsignedInt", TypeKind::PrimitiveType),
    ("positiveInt", TypeKind::PrimitiveType),
    ("Quantity", TypeKind::ComplexType),
];

/// Explicit (child, parent) edges.
pub const BUILTIN_HIERARCHY: &[(&str, &str)] = &[
    ("BackboneElement", "Element"),
    ("DomainResource", "Resource"),
    ("Quantity", "Element"),
    ("code", "string"),
    ("id", "string"),
    ("markdown", "string"),
    ("url", "uri"),
    ("canonical", "uri"),
    ("oid", "uri"),
    ("uuid", "uri"),
    ("unsignedInt", "integer"),
    ("positiveInt", "integer"),
];

/// FHIRPath System types and their FHIR counterparts.
pub const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("System.Boolean", "boolean"),
    ("System.Integer", "integer"),
    ("System.Decimal", "decimal"),
    ("System.String", "string"),
    ("System.Date", "date"),
    ("System.DateTime", "dateTime"),
    ("System.Time", "time"),
    ("System.Quantity", "Quantity"),
    ("Boolean", "boolean"),
    ("Integer", "integer"),
    ("Decimal", "decimal"),
    ("String", "string"),
    ("Date", "date"),
    ("DateTime", "dateTime"),
    ("Time", "time"),
];

/// Namespace prefixes that may qualify a type name.
pub const NAMESPACE_PREFIXES: &[&str] = &["FHIR."];

/// How a value is represented in JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonKind {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

/// JSON representation of a primitive type, if `name` is one.
pub fn primitive_json_kind(name: &str) -> Option<JsonKind> {
    match name {
        "boolean" => Some(JsonKind::Boolean),
        "integer" | "unsignedInt" | "positiveInt" => Some(JsonKind::Integer),
        "decimal" => Some(JsonKind::Number),
        "string" | "uri" | "date" | "dateTime" | "instant" | "time" | "base64Binary" | "code"
        | "id" | "markdown" | "url" | "canonical" | "oid" | "uuid" | "xhtml" => {
            Some(JsonKind::String)
        }
        _ => None,
    }
}

/// JSON field name of one concrete type of a choice element:
/// `value` + `Quantity` -> `valueQuantity`, `deceased` + `boolean` -> `deceasedBoolean`.
pub fn choice_field_name(base_name: &str, type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", base_name, first.to_uppercase(), chars.as_str()),
        None => base_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_field_name() {
        assert_eq!(choice_field_name("value", "Quantity"), "valueQuantity");
        assert_eq!(choice_field_name("deceased", "boolean"), "deceasedBoolean");
        assert_eq!(choice_field_name("effective", "dateTime"), "effectiveDateTime");
    }

    #[test]
    fn test_primitive_json_kinds() {
        assert_eq!(primitive_json_kind("code"), Some(JsonKind::String));
        assert_eq!(primitive_json_kind("positiveInt"), Some(JsonKind::Integer));
        assert_eq!(primitive_json_kind("decimal"), Some(JsonKind::Number));
        assert_eq!(primitive_json_kind("HumanName"), None);
    }

    #[test]
    fn test_builtin_schema_is_embedded() {
        assert!(BUILTIN_SCHEMA.contains("name: Patient"));
    }
}
