//! Translation against a schema-definition document loaded from disk

#[cfg(test)]
mod custom_schema_tests {
    use std::io::Write;

    use fhirpath_sql::ast::AstNode;
    use fhirpath_sql::config::TranslatorConfig;
    use fhirpath_sql::dialect::DialectKind;
    use fhirpath_sql::{QueryGenerator, QueryGeneratorError};
    use tempfile::NamedTempFile;

    const DEVICE_SCHEMA: &str = r#"
name: device-lab
version: "0.1"
types:
  - name: Device
    kind: resource
    base: DomainResource
    elements:
      - { name: status, types: [code] }
      - { name: note, types: [string], max: "*" }
      - name: property
        types: [BackboneElement]
        max: "*"
        elements:
          - { name: label, types: [string] }
profiles:
  - { name: implant, url: "http://example.org/implant", base: Device }
"#;

    fn schema_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn generator(file: &NamedTempFile, strict: bool) -> Result<QueryGenerator, QueryGeneratorError> {
        QueryGenerator::from_config(&TranslatorConfig {
            dialect: DialectKind::PostgreSql,
            schema_path: Some(file.path().to_path_buf()),
            strict_paths: strict,
            ..Default::default()
        })
    }

    #[test]
    fn test_array_element_from_custom_schema_is_unnested() {
        let file = schema_file(DEVICE_SCHEMA);
        let generator = generator(&file, true).unwrap();
        let fragments = generator
            .fragments(&AstNode::path(&["Device", "note"]))
            .unwrap();
        assert_eq!(fragments.len(), 2);
        assert!(fragments[1].requires_unnest);
        assert_eq!(fragments[1].fhir_type(), Some("string"));
    }

    #[test]
    fn test_nested_backbone_element_resolves() {
        let file = schema_file(DEVICE_SCHEMA);
        let generator = generator(&file, true).unwrap();
        let sql = generator
            .generate_ast(&AstNode::path(&["Device", "property", "label"]))
            .unwrap();
        assert!(sql.contains("'label'"));
    }

    #[test]
    fn test_strict_paths_reject_undeclared_elements() {
        let file = schema_file(DEVICE_SCHEMA);
        let strict = generator(&file, true).unwrap();
        assert!(strict
            .generate_ast(&AstNode::path(&["Device", "serial"]))
            .is_err());
        let lenient = generator(&file, false).unwrap();
        assert!(lenient
            .generate_ast(&AstNode::path(&["Device", "serial"]))
            .is_ok());
    }

    #[test]
    fn test_bundled_resources_are_absent_from_custom_schema() {
        let file = schema_file(DEVICE_SCHEMA);
        let generator = generator(&file, false).unwrap();
        let ast = AstNode::path(&["Device", "status"])
            .call("ofType", vec![AstNode::identifier("Observation")]);
        assert!(generator.generate_ast(&ast).is_err());
    }

    #[test]
    fn test_invalid_schema_is_registry_error() {
        let file = schema_file("types:\n  - { name: Loop, kind: complex-type, base: Loop }\n");
        assert!(matches!(
            generator(&file, false),
            Err(QueryGeneratorError::Registry(_))
        ));
    }
}
