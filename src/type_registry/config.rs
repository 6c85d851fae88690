//! Schema-definition documents.
//!
//! The type registry is fed from a YAML (or JSON, which YAML accepts) document
//! describing the record schema:
//!
//! ```yaml
//! name: fhir-r4-core
//! version: "4.0.1"
//! types:
//!   - name: Patient
//!     kind: resource
//!     base: DomainResource
//!     elements:
//!       - { name: gender, types: [code] }
//!       - { name: name, types: [HumanName], max: "*" }
//!       - name: contact
//!         types: [BackboneElement]
//!         max: "*"
//!         elements:
//!           - { name: gender, types: [code] }
//!   - { name: code, kind: primitive-type, base: string }
//! aliases:
//!   System.String: string
//! profiles:
//!   - { name: bp, url: "http://hl7.org/fhir/StructureDefinition/bp", base: Observation }
//! ```
//!
//! Where the document comes from is the caller's business; this module only
//! parses and structurally validates it.
use super::errors::TypeRegistryError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// Kind of a schema type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TypeKind {
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// Top-level schema definition document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub types: Vec<TypeDefinition>,
    /// Alias name -> target type name
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub profiles: Vec<ProfileDefinition>,
}

/// One type in the schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub elements: Vec<ElementDefinition>,
}

/// One element (property) of a type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDefinition {
    /// Element name; choice elements end in `[x]`
    pub name: String,
    pub types: Vec<String>,
    /// Upper cardinality bound ("1" or "*"); absent means "1"
    #[serde(default)]
    pub max: Option<String>,
    /// Nested elements of an inline BackboneElement
    #[serde(default)]
    pub elements: Vec<ElementDefinition>,
}

/// A constrained type that maps back to an unconstrained base
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    pub base: String,
}

impl ElementDefinition {
    pub fn is_choice(&self) -> bool {
        self.name.ends_with("[x]")
    }

    /// Element name without the `[x]` choice marker
    pub fn base_name(&self) -> &str {
        self.name.strip_suffix("[x]").unwrap_or(&self.name)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.max.as_deref(), Some(max) if max != "0" && max != "1")
    }
}

impl SchemaDefinition {
    /// Load a schema definition from a YAML or JSON file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, TypeRegistryError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| TypeRegistryError::ConfigReadError {
            error: format!("{}: {}", path.display(), e),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse a schema definition from YAML (or JSON) text
    pub fn from_yaml_str(content: &str) -> Result<Self, TypeRegistryError> {
        let definition: SchemaDefinition =
            serde_yaml::from_str(content).map_err(|e| TypeRegistryError::ConfigParseError {
                error: e.to_string(),
            })?;
        definition.validate()?;
        Ok(definition)
    }

    /// Structural validation: unique type names, non-empty element type lists,
    /// well-formed choice names. Reference checks (unknown base types, cycles)
    /// happen when the registry is built, because the built-in hierarchy takes part.
    pub fn validate(&self) -> Result<(), TypeRegistryError> {
        let mut seen = HashSet::new();
        for ty in &self.types {
            if ty.name.trim().is_empty() {
                return Err(TypeRegistryError::InvalidDefinition {
                    message: "type with empty name".to_string(),
                });
            }
            if !seen.insert(ty.name.as_str()) {
                return Err(TypeRegistryError::invalid_type_definition(
                    &ty.name,
                    "defined more than once",
                ));
            }
            if ty.base.as_deref() == Some(ty.name.as_str()) {
                return Err(TypeRegistryError::HierarchyCycle {
                    type_name: ty.name.clone(),
                });
            }
            validate_elements(&ty.name, &ty.elements)?;
        }

        for profile in &self.profiles {
            if profile.name.trim().is_empty() || profile.base.trim().is_empty() {
                return Err(TypeRegistryError::InvalidDefinition {
                    message: format!("profile `{}` needs a name and a base", profile.name),
                });
            }
        }
        Ok(())
    }
}

fn validate_elements(owner: &str, elements: &[ElementDefinition]) -> Result<(), TypeRegistryError> {
    let mut names = HashSet::new();
    for element in elements {
        if element.types.is_empty() {
            return Err(TypeRegistryError::invalid_type_definition(
                owner,
                format!("element `{}` has no types", element.name),
            ));
        }
        if element.base_name().contains('[') || element.base_name().is_empty() {
            return Err(TypeRegistryError::invalid_type_definition(
                owner,
                format!("malformed element name `{}`", element.name),
            ));
        }
        if !names.insert(element.base_name()) {
            return Err(TypeRegistryError::invalid_type_definition(
                owner,
                format!("element `{}` declared twice", element.base_name()),
            ));
        }
        if !element.is_choice() && element.types.len() > 1 {
            return Err(TypeRegistryError::invalid_type_definition(
                owner,
                format!(
                    "element `{}` lists several types but is not a choice element",
                    element.name
                ),
            ));
        }
        if !element.elements.is_empty() {
            validate_elements(&format!("{}.{}", owner, element.base_name()), &element.elements)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_definition() {
        let yaml = r#"
name: tiny
types:
  - name: Thing
    kind: resource
    elements:
      - { name: label, types: [string] }
      - { name: tags, types: [string], max: "*" }
      - { name: "value[x]", types: [string, integer] }
"#;
        let def = SchemaDefinition::from_yaml_str(yaml).unwrap();
        assert_eq!(def.name.as_deref(), Some("tiny"));
        let thing = &def.types[0];
        assert_eq!(thing.kind, TypeKind::Resource);
        assert!(!thing.elements[0].is_array());
        assert!(thing.elements[1].is_array());
        assert!(thing.elements[2].is_choice());
        assert_eq!(thing.elements[2].base_name(), "value");
    }

    #[test]
    fn test_json_is_accepted() {
        let json = r#"{"types": [{"name": "Thing", "kind": "complex-type"}]}"#;
        let def = SchemaDefinition::from_yaml_str(json).unwrap();
        assert_eq!(def.types[0].kind, TypeKind::ComplexType);
    }

    #[test]
    fn test_duplicate_type_is_rejected() {
        let yaml = r#"
types:
  - { name: Thing, kind: resource }
  - { name: Thing, kind: resource }
"#;
        let err = SchemaDefinition::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, TypeRegistryError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_multi_type_non_choice_is_rejected() {
        let yaml = r#"
types:
  - name: Thing
    kind: resource
    elements:
      - { name: value, types: [string, integer] }
"#;
        assert!(SchemaDefinition::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_self_base_is_a_cycle() {
        let yaml = r#"
types:
  - { name: Loop, kind: complex-type, base: Loop }
"#;
        assert!(matches!(
            SchemaDefinition::from_yaml_str(yaml),
            Err(TypeRegistryError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn test_unparseable_yaml() {
        let err = SchemaDefinition::from_yaml_str("types: [ {").unwrap_err();
        assert!(matches!(err, TypeRegistryError::ConfigParseError { .. }));
    }
}
