//! End-to-end translation properties

#[cfg(test)]
mod pipeline_tests {
    use fhirpath_sql::ast::{AstNode, BinaryOperator, Literal, RawNode};
    use fhirpath_sql::config::TranslatorConfig;
    use fhirpath_sql::dialect::DialectKind;
    use fhirpath_sql::{QueryGenerator, QueryGeneratorError};
    use test_case::test_case;

    fn generator(dialect: DialectKind) -> QueryGenerator {
        QueryGenerator::from_config(&TranslatorConfig {
            dialect,
            ..Default::default()
        })
        .expect("bundled schema loads")
    }

    fn union(items: Vec<AstNode>) -> AstNode {
        let mut iter = items.into_iter();
        let first = iter.next().expect("at least one item");
        iter.fold(first, |acc, item| {
            AstNode::binary(BinaryOperator::Union, acc, item)
        })
    }

    #[test_case(DialectKind::DuckDb ; "duckdb")]
    #[test_case(DialectKind::PostgreSql ; "postgresql")]
    fn test_translation_is_deterministic(dialect: DialectKind) {
        let ast = AstNode::path(&["Patient", "name", "given"]).call("first", vec![]);
        let generator = generator(dialect);
        assert_eq!(
            generator.generate_ast(&ast).unwrap(),
            generator.generate_ast(&ast).unwrap()
        );
    }

    #[test_case(DialectKind::DuckDb ; "duckdb")]
    #[test_case(DialectKind::PostgreSql ; "postgresql")]
    fn test_union_keeps_duplicates_for_count(dialect: DialectKind) {
        let ast = union(vec![
            AstNode::integer(1),
            AstNode::integer(1),
            AstNode::integer(2),
        ])
        .call("count", vec![]);
        let sql = generator(dialect).generate_ast(&ast).unwrap();
        assert!(sql.contains("array_length("));
        assert!(!sql.contains("DISTINCT"));
        assert!(sql.ends_with("SELECT * FROM cte_2"));
    }

    #[test_case("allTrue", "bool_and(", "TRUE" ; "all true")]
    #[test_case("allFalse", "bool_and((NOT ", "TRUE" ; "all false")]
    #[test_case("anyTrue", "bool_or(", "FALSE" ; "any true")]
    #[test_case("anyFalse", "bool_or((NOT ", "FALSE" ; "any false")]
    fn test_empty_boolean_reductions(function: &str, aggregate: &str, default: &str) {
        let ast = AstNode::literal(Literal::Null).call(function, vec![]);
        for dialect in [DialectKind::DuckDb, DialectKind::PostgreSql] {
            let sql = generator(dialect).generate_ast(&ast).unwrap();
            assert!(
                sql.contains(&format!("COALESCE({}", aggregate)),
                "{} on {}: {}",
                function,
                dialect,
                sql
            );
            assert!(sql.contains(&format!(", {})", default)));
        }
    }

    #[test]
    fn test_of_type_string_matches_declared_code() {
        let generator = generator(DialectKind::PostgreSql);
        let gender = AstNode::path(&["Patient", "gender"]);
        let filtered = gender
            .clone()
            .call("ofType", vec![AstNode::identifier("string")]);
        let plain = generator.fragments(&gender).unwrap();
        let typed = generator.fragments(&filtered).unwrap();
        let last = typed.last().unwrap();
        assert_eq!(last.fhir_type(), Some("code"));
        assert_eq!(last.expression, plain.last().unwrap().expression);
    }

    #[test]
    fn test_dialects_differ_only_in_syntax() {
        let ast = AstNode::path(&["Patient", "name"]).call("count", vec![]);
        let duck = generator(DialectKind::DuckDb).fragments(&ast).unwrap();
        let pg = generator(DialectKind::PostgreSql).fragments(&ast).unwrap();
        assert_eq!(duck.len(), pg.len());
        for (d, p) in duck.iter().zip(&pg) {
            assert_eq!(d.cte_name(), p.cte_name());
            assert_eq!(d.dependencies, p.dependencies);
            assert_eq!(d.requires_unnest, p.requires_unnest);
            assert_eq!(d.is_aggregate, p.is_aggregate);
        }
        assert_ne!(duck.last().unwrap().expression, pg.last().unwrap().expression);
    }

    #[test]
    fn test_every_cte_is_named_in_order() {
        let ast = AstNode::path(&["Patient", "name", "given"]);
        let sql = generator(DialectKind::DuckDb).generate_ast(&ast).unwrap();
        let positions: Vec<usize> = ["cte_1 AS (", "cte_2 AS (", "cte_3 AS ("]
            .iter()
            .map(|name| sql.find(name).expect("cte present"))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(sql.ends_with("SELECT * FROM cte_3"));
    }

    #[test]
    fn test_resource_table_is_configurable() {
        let generator = QueryGenerator::from_config(&TranslatorConfig {
            resource_table: "fhir.resources".to_string(),
            resource_column: "body".to_string(),
            ..Default::default()
        })
        .unwrap();
        let sql = generator
            .generate_ast(&AstNode::identifier("Patient"))
            .unwrap();
        assert!(sql.contains("r.body AS value FROM fhir.resources AS r"));
    }

    #[test]
    fn test_generate_from_parser_json() {
        let raw = RawNode::entire(RawNode::call(
            RawNode::path(&["Patient", "name"]),
            "exists",
            vec![],
        ));
        let json = serde_json::to_string(&raw).unwrap();
        let sql = generator(DialectKind::DuckDb).generate(&json).unwrap();
        assert!(sql.starts_with("WITH cte_1 AS (SELECT r.id AS id"));
    }

    #[test]
    fn test_unknown_function_surfaces_translator_error() {
        let ast = AstNode::path(&["Patient", "name"]).call("frobnicate", vec![]);
        let err = generator(DialectKind::DuckDb).generate_ast(&ast).unwrap_err();
        assert!(matches!(err, QueryGeneratorError::Translator(_)));
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_explain_serializes_to_json() {
        let raw = RawNode::entire(RawNode::path(&["Patient", "gender"]));
        let json = serde_json::to_string(&raw).unwrap();
        let explanation = generator(DialectKind::PostgreSql).explain(&json).unwrap();
        let value = serde_json::to_value(&explanation).unwrap();
        assert_eq!(value["dialect"], "postgresql");
        assert!(value["fragments"].as_array().is_some_and(|f| f.len() == 2));
        assert!(value["sql"].as_str().is_some_and(|s| s.starts_with("WITH ")));
    }
}
