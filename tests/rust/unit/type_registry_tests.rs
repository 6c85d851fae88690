//! Unit tests for type registry loading and type queries

#[cfg(test)]
mod type_registry_tests {
    use std::io::Write;

    use fhirpath_sql::type_registry::{Cardinality, TypeRegistry, TypeRegistryError};
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn builtin() -> TypeRegistry {
        TypeRegistry::builtin().expect("bundled schema loads")
    }

    fn load(content: &str) -> Result<TypeRegistry, TypeRegistryError> {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        TypeRegistry::from_yaml_file(file.path())
    }

    #[test_case("Patient", "DomainResource", true ; "resource to domain resource")]
    #[test_case("Patient", "Resource", true ; "transitive")]
    #[test_case("Patient", "Observation", false ; "unrelated resources")]
    #[test_case("Patient", "Patient", false ; "not a strict subtype of itself")]
    #[test_case("code", "string", true ; "primitive specialization")]
    #[test_case("code", "System.String", true ; "system alias")]
    fn test_is_subtype_of(child: &str, parent: &str, expected: bool) {
        assert_eq!(builtin().is_subtype_of(child, parent).unwrap(), expected);
    }

    #[test]
    fn test_same_or_subtype_includes_identity() {
        assert!(builtin().is_same_or_subtype_of("Patient", "Patient").unwrap());
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(matches!(
            builtin().canonicalize("Patinet"),
            Err(TypeRegistryError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_choice_types_of_observation_value() {
        let types = builtin().choice_types("Observation", "value").unwrap();
        assert!(types.contains(&"Quantity".to_string()));
        assert!(types.contains(&"string".to_string()));
        assert!(builtin().choice_types("Patient", "gender").is_none());
    }

    #[test_case("Patient.name", Cardinality::Array ; "array")]
    #[test_case("Patient.gender", Cardinality::Single ; "single")]
    #[test_case("Patient.name.given", Cardinality::Array ; "nested array")]
    fn test_cardinality(path: &str, expected: Cardinality) {
        assert_eq!(builtin().get_cardinality(path).unwrap(), expected);
    }

    #[test]
    fn test_custom_schema_with_profile() {
        let registry = load(
            r#"
name: lab
types:
  - name: Specimen
    kind: resource
    base: DomainResource
    elements:
      - { name: note, types: [string], max: "*" }
profiles:
  - { name: blood, url: "http://example.org/blood", base: Specimen }
"#,
        )
        .unwrap();
        assert_eq!(registry.schema_name(), Some("lab"));
        assert!(registry.is_resource("Specimen"));
        assert_eq!(
            registry.get_profile_base_type("http://example.org/blood"),
            Some("Specimen".to_string())
        );
        assert_eq!(
            registry.get_cardinality("Specimen.note").unwrap(),
            Cardinality::Array
        );
    }

    #[test_case("types:\n  - { name: A, kind: complex-type, base: B }\n  - { name: B, kind: complex-type, base: A }\n" ; "hierarchy cycle")]
    #[test_case("types:\n  - { name: A, kind: complex-type, base: Missing }\n" ; "unknown base")]
    #[test_case("types:\n  - name: A\n    kind: complex-type\n    elements:\n      - { name: x, types: [] }\n" ; "element without types")]
    #[test_case("types: [" ; "unparsable")]
    fn test_invalid_schema_is_load_error(content: &str) {
        let err = load(content).unwrap_err();
        assert!(err.is_load_error(), "{:?}", err);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        assert!(matches!(
            TypeRegistry::from_yaml_file("/nonexistent/schema.yaml"),
            Err(TypeRegistryError::ConfigReadError { .. })
        ));
    }
}
