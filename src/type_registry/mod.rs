//! Type registry for the record schema.
//!
//! Answers every schema question the translator and the AST adapter ask:
//! canonical names, subtype relationships, element cardinalities, choice
//! (polymorphic) elements, structural elements and profile bases.
//!
//! The registry is built once, from the built-in hierarchy plus a
//! schema-definition document, and is read-only afterwards. Share it with
//! `Arc<TypeRegistry>`.

pub mod builtin;
pub mod config;
pub mod errors;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use builtin::{choice_field_name, JsonKind};
pub use config::{ElementDefinition, SchemaDefinition, TypeKind};
pub use errors::TypeRegistryError;

/// A type name that has been resolved through aliases to its schema name.
pub type CanonicalName = String;

/// Upper bound of an element's cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Single,
    Array,
}

/// Resolved element metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    /// Element name without a `[x]` marker
    pub name: String,
    /// Type declaring the element
    pub owner: CanonicalName,
    pub type_codes: Vec<CanonicalName>,
    pub cardinality: Cardinality,
    pub is_choice: bool,
}

impl ElementInfo {
    /// The element's type when it has exactly one.
    pub fn single_type(&self) -> Option<&str> {
        match self.type_codes.as_slice() {
            [only] if !self.is_choice => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }
}

/// One schema type's metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub name: CanonicalName,
    pub kind: TypeKind,
    pub base: Option<CanonicalName>,
    pub is_abstract: bool,
    /// Synthetic type standing for an inline BackboneElement path (`Patient.contact`)
    pub is_backbone: bool,
    pub elements: BTreeMap<String, ElementInfo>,
    pub aliases: BTreeSet<String>,
}

impl TypeEntry {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base: None,
            is_abstract: false,
            is_backbone: false,
            elements: BTreeMap::new(),
            aliases: BTreeSet::new(),
        }
    }

    /// Composite, non-independently-addressable type
    pub fn is_structural(&self) -> bool {
        self.kind == TypeKind::ComplexType || self.is_backbone
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    schema_name: Option<String>,
    schema_version: Option<String>,
    types: HashMap<CanonicalName, TypeEntry>,
    aliases: HashMap<String, CanonicalName>,
    parents: HashMap<CanonicalName, BTreeSet<CanonicalName>>,
    profiles: HashMap<String, CanonicalName>,
}

impl TypeRegistry {
    /// Registry over the embedded FHIR R4 core subset.
    pub fn builtin() -> Result<Self, TypeRegistryError> {
        let definition = SchemaDefinition::from_yaml_str(builtin::BUILTIN_SCHEMA)?;
        Self::from_definition(definition)
    }

    /// Registry over a schema-definition file (YAML or JSON).
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, TypeRegistryError> {
        let definition = SchemaDefinition::from_yaml_file(path)?;
        Self::from_definition(definition)
    }

    /// Build the registry: built-in types and hierarchy first, then the
    /// schema's types, aliases and profiles. Every reference is checked and the
    /// merged hierarchy must be acyclic.
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self, TypeRegistryError> {
        let mut registry = TypeRegistry {
            schema_name: definition.name.clone(),
            schema_version: definition.version.clone(),
            ..Default::default()
        };

        for (name, kind) in builtin::BUILTIN_TYPES {
            registry
                .types
                .insert(name.to_string(), TypeEntry::new(name, *kind));
        }
        for (child, parent) in builtin::BUILTIN_HIERARCHY {
            registry.add_edge(child, parent);
        }

        for type_def in &definition.types {
            let mut entry = TypeEntry::new(&type_def.name, type_def.kind);
            entry.base = type_def.base.clone();
            entry.is_abstract = type_def.is_abstract;
            if let Some(base) = &type_def.base {
                registry.add_edge(&type_def.name, base);
            }
            registry.register_elements(&mut entry, &type_def.elements);
            registry.types.insert(type_def.name.clone(), entry);
        }

        for (alias, target) in builtin::BUILTIN_ALIASES {
            registry.add_alias(alias, target)?;
        }
        for (alias, target) in &definition.aliases {
            registry.add_alias(alias, target)?;
        }

        registry.check_references()?;
        registry.check_acyclic()?;

        for profile in &definition.profiles {
            let base = registry.canonicalize(&profile.base).map_err(|_| {
                TypeRegistryError::InvalidDefinition {
                    message: format!(
                        "profile `{}` has unknown base `{}`",
                        profile.name, profile.base
                    ),
                }
            })?;
            registry.profiles.insert(profile.name.clone(), base.clone());
            if let Some(url) = &profile.url {
                registry.profiles.insert(url.clone(), base);
            }
        }

        log::debug!(
            "Type registry loaded: schema={:?} version={:?} types={} aliases={} profiles={}",
            registry.schema_name,
            registry.schema_version,
            registry.types.len(),
            registry.aliases.len(),
            definition.profiles.len()
        );
        Ok(registry)
    }

    fn add_edge(&mut self, child: &str, parent: &str) {
        self.parents
            .entry(child.to_string())
            .or_default()
            .insert(parent.to_string());
    }

    fn add_alias(&mut self, alias: &str, target: &str) -> Result<(), TypeRegistryError> {
        if !self.types.contains_key(target) {
            return Err(TypeRegistryError::InvalidDefinition {
                message: format!("alias `{}` points at unknown type `{}`", alias, target),
            });
        }
        self.aliases.insert(alias.to_string(), target.to_string());
        if let Some(entry) = self.types.get_mut(target) {
            entry.aliases.insert(alias.to_string());
        }
        Ok(())
    }

    /// Register the elements of `entry`; inline backbone elements become
    /// synthetic structural types named by their path.
    fn register_elements(&mut self, entry: &mut TypeEntry, elements: &[ElementDefinition]) {
        for element in elements {
            let mut type_codes = element.types.clone();
            if !element.elements.is_empty() {
                let synthetic_name = format!("{}.{}", entry.name, element.base_name());
                let mut synthetic = TypeEntry::new(&synthetic_name, TypeKind::ComplexType);
                synthetic.base = Some("BackboneElement".to_string());
                synthetic.is_backbone = true;
                self.add_edge(&synthetic_name, "BackboneElement");
                self.register_elements(&mut synthetic, &element.elements);
                self.types.insert(synthetic_name.clone(), synthetic);
                type_codes = vec![synthetic_name];
            }
            let info = ElementInfo {
                name: element.base_name().to_string(),
                owner: entry.name.clone(),
                type_codes,
                cardinality: if element.is_array() {
                    Cardinality::Array
                } else {
                    Cardinality::Single
                },
                is_choice: element.is_choice(),
            };
            entry.elements.insert(info.name.clone(), info);
        }
    }

    fn check_references(&self) -> Result<(), TypeRegistryError> {
        for (child, parents) in &self.parents {
            for parent in parents {
                if !self.types.contains_key(parent) {
                    return Err(TypeRegistryError::invalid_type_definition(
                        child,
                        format!("unknown base type `{}`", parent),
                    ));
                }
            }
        }
        for entry in self.types.values() {
            for element in entry.elements.values() {
                for code in &element.type_codes {
                    if !self.types.contains_key(code) && !self.aliases.contains_key(code) {
                        return Err(TypeRegistryError::invalid_type_definition(
                            &entry.name,
                            format!("element `{}` uses unknown type `{}`", element.name, code),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Depth-first search with white/grey/black marking.
    fn check_acyclic(&self) -> Result<(), TypeRegistryError> {
        fn visit<'a>(
            node: &'a str,
            parents: &'a HashMap<CanonicalName, BTreeSet<CanonicalName>>,
            in_progress: &mut HashSet<&'a str>,
            done: &mut HashSet<&'a str>,
        ) -> Result<(), TypeRegistryError> {
            if done.contains(node) {
                return Ok(());
            }
            if !in_progress.insert(node) {
                return Err(TypeRegistryError::HierarchyCycle {
                    type_name: node.to_string(),
                });
            }
            if let Some(next) = parents.get(node) {
                for parent in next {
                    visit(parent, parents, in_progress, done)?;
                }
            }
            in_progress.remove(node);
            done.insert(node);
            Ok(())
        }

        let mut in_progress = HashSet::new();
        let mut done = HashSet::new();
        let mut roots: Vec<&String> = self.parents.keys().collect();
        roots.sort();
        for child in roots {
            visit(child, &self.parents, &mut in_progress, &mut done)?;
        }
        Ok(())
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    /// Resolve a type name or alias to its canonical schema name.
    ///
    /// Accepts backtick-quoted names and the `FHIR.` namespace prefix.
    pub fn canonicalize(&self, name: &str) -> Result<CanonicalName, TypeRegistryError> {
        let trimmed = name.trim().trim_matches('`');
        if self.types.contains_key(trimmed) {
            return Ok(trimmed.to_string());
        }
        if let Some(target) = self.aliases.get(trimmed) {
            return Ok(target.clone());
        }
        for prefix in builtin::NAMESPACE_PREFIXES {
            if let Some(unqualified) = trimmed.strip_prefix(prefix) {
                if self.types.contains_key(unqualified) {
                    return Ok(unqualified.to_string());
                }
            }
        }
        Err(TypeRegistryError::UnknownType {
            name: name.to_string(),
        })
    }

    pub fn entry(&self, name: &str) -> Result<&TypeEntry, TypeRegistryError> {
        let canonical = self.canonicalize(name)?;
        self.types
            .get(&canonical)
            .ok_or(TypeRegistryError::UnknownType { name: canonical })
    }

    /// Every proper ancestor of `name`, nearest first.
    pub fn ancestors(&self, name: &str) -> Result<Vec<CanonicalName>, TypeRegistryError> {
        let start = self.canonicalize(name)?;
        let mut seen = BTreeSet::new();
        let mut ordered = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.parents.get(&current) {
                for parent in parents {
                    if seen.insert(parent.clone()) {
                        ordered.push(parent.clone());
                        queue.push_back(parent.clone());
                    }
                }
            }
        }
        Ok(ordered)
    }

    /// Strict subtype test: a type is never a subtype of itself.
    pub fn is_subtype_of(&self, child: &str, parent: &str) -> Result<bool, TypeRegistryError> {
        let parent = self.canonicalize(parent)?;
        Ok(self.ancestors(child)?.contains(&parent))
    }

    pub fn is_same_or_subtype_of(
        &self,
        child: &str,
        parent: &str,
    ) -> Result<bool, TypeRegistryError> {
        if self.canonicalize(child)? == self.canonicalize(parent)? {
            return Ok(true);
        }
        self.is_subtype_of(child, parent)
    }

    pub fn type_kind(&self, name: &str) -> Result<TypeKind, TypeRegistryError> {
        Ok(self.entry(name)?.kind)
    }

    pub fn is_resource(&self, name: &str) -> bool {
        matches!(self.entry(name), Ok(entry) if entry.kind == TypeKind::Resource)
    }

    pub fn is_primitive(&self, name: &str) -> bool {
        matches!(self.entry(name), Ok(entry) if entry.kind == TypeKind::PrimitiveType)
    }

    /// JSON representation of a primitive type (walking up to a known primitive).
    pub fn primitive_json_kind(&self, name: &str) -> Option<JsonKind> {
        let canonical = self.canonicalize(name).ok()?;
        builtin::primitive_json_kind(&canonical).or_else(|| {
            self.ancestors(&canonical)
                .ok()?
                .iter()
                .find_map(|ancestor| builtin::primitive_json_kind(ancestor))
        })
    }

    /// Look up an element on a type or any of its ancestors.
    ///
    /// A concrete choice field (`valueQuantity`) resolves to a single-typed view
    /// of its choice element.
    pub fn element(&self, type_name: &str, element: &str) -> Result<ElementInfo, TypeRegistryError> {
        let canonical = self.canonicalize(type_name)?;
        let mut lineage = vec![canonical.clone()];
        lineage.extend(self.ancestors(&canonical)?);

        for owner in &lineage {
            let Some(entry) = self.types.get(owner) else {
                continue;
            };
            if let Some(info) = entry.elements.get(element) {
                return Ok(info.clone());
            }
            for info in entry.elements.values().filter(|info| info.is_choice) {
                for code in &info.type_codes {
                    if choice_field_name(&info.name, code) == element {
                        return Ok(ElementInfo {
                            name: element.to_string(),
                            owner: info.owner.clone(),
                            type_codes: vec![code.clone()],
                            cardinality: info.cardinality,
                            is_choice: false,
                        });
                    }
                }
            }
        }
        Err(TypeRegistryError::UnknownElement {
            path: format!("{}.{}", canonical, element),
        })
    }

    /// Concrete types of a choice element, or `None` when the element is not polymorphic.
    pub fn choice_types(&self, type_name: &str, element: &str) -> Option<Vec<CanonicalName>> {
        self.element(type_name, element)
            .ok()
            .filter(|info| info.is_choice)
            .map(|info| info.type_codes)
    }

    /// Walk a `Type.element.element` path and return the final element.
    pub fn resolve_path(&self, path: &str) -> Result<ElementInfo, TypeRegistryError> {
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        let mut current_type = self.canonicalize(root)?;
        let mut resolved: Option<ElementInfo> = None;

        for segment in segments {
            if let Some(previous) = &resolved {
                current_type = previous
                    .single_type()
                    .map(str::to_string)
                    .ok_or_else(|| TypeRegistryError::UnknownElement {
                        path: path.to_string(),
                    })?;
            }
            resolved = Some(self.element(&current_type, segment).map_err(|e| match e {
                TypeRegistryError::UnknownElement { .. } => TypeRegistryError::UnknownElement {
                    path: path.to_string(),
                },
                other => other,
            })?);
        }

        resolved.ok_or_else(|| TypeRegistryError::UnknownElement {
            path: path.to_string(),
        })
    }

    /// Cardinality of the element a path ends in.
    pub fn get_cardinality(&self, path: &str) -> Result<Cardinality, TypeRegistryError> {
        Ok(self.resolve_path(path)?.cardinality)
    }

    /// True for composite, non-resource types and for backbone-element paths.
    /// Accepts either a type name (`HumanName`) or an element path (`Patient.contact`).
    pub fn is_structural_element(&self, path: &str) -> bool {
        if let Ok(entry) = self.entry(path) {
            return entry.is_structural();
        }
        if !path.contains('.') {
            return false;
        }
        self.resolve_path(path)
            .ok()
            .and_then(|info| info.single_type().map(str::to_string))
            .and_then(|ty| self.entry(&ty).ok().map(TypeEntry::is_structural))
            .unwrap_or(false)
    }

    /// Base type of a profile, looked up by profile name or canonical URL.
    pub fn get_profile_base_type(&self, name: &str) -> Option<CanonicalName> {
        self.profiles.get(name.trim().trim_matches('`')).cloned()
    }

    /// All canonical type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::builtin().expect("builtin schema loads")
    }

    #[test]
    fn test_canonicalize_aliases() {
        let reg = registry();
        assert_eq!(reg.canonicalize("System.String").unwrap(), "string");
        assert_eq!(reg.canonicalize("String").unwrap(), "string");
        assert_eq!(reg.canonicalize("FHIR.Patient").unwrap(), "Patient");
        assert_eq!(reg.canonicalize("`Quantity`").unwrap(), "Quantity");
        assert_eq!(reg.canonicalize("code").unwrap(), "code");
    }

    #[test]
    fn test_canonicalize_unknown_type_errors() {
        let err = registry().canonicalize("Quantiy").unwrap_err();
        assert_eq!(
            err,
            TypeRegistryError::UnknownType {
                name: "Quantiy".to_string()
            }
        );
    }

    #[test]
    fn test_subtype_relationships() {
        let reg = registry();
        assert!(reg.is_subtype_of("Patient", "DomainResource").unwrap());
        assert!(reg.is_subtype_of("Patient", "Resource").unwrap());
        assert!(!reg.is_subtype_of("Patient", "Observation").unwrap());
        assert!(reg.is_subtype_of("code", "string").unwrap());
        assert!(reg.is_subtype_of("Age", "Quantity").unwrap());
    }

    #[test]
    fn test_subtype_is_irreflexive() {
        let reg = registry();
        assert!(!reg.is_subtype_of("Patient", "Patient").unwrap());
        assert!(reg.is_same_or_subtype_of("Patient", "Patient").unwrap());
        assert!(reg.is_same_or_subtype_of("id", "System.String").unwrap());
    }

    #[test]
    fn test_subtype_with_unknown_type_errors() {
        assert!(registry().is_subtype_of("Patient", "Nope").is_err());
    }

    #[test]
    fn test_cardinality() {
        let reg = registry();
        assert_eq!(reg.get_cardinality("Patient.name").unwrap(), Cardinality::Array);
        assert_eq!(reg.get_cardinality("Patient.gender").unwrap(), Cardinality::Single);
        assert_eq!(
            reg.get_cardinality("Patient.name.given").unwrap(),
            Cardinality::Array
        );
        assert_eq!(
            reg.get_cardinality("Patient.contact.name").unwrap(),
            Cardinality::Single
        );
        // inherited from Resource
        assert_eq!(reg.get_cardinality("Patient.id").unwrap(), Cardinality::Single);
    }

    #[test]
    fn test_cardinality_unknown_element() {
        assert!(matches!(
            registry().get_cardinality("Patient.nickname"),
            Err(TypeRegistryError::UnknownElement { .. })
        ));
    }

    #[test]
    fn test_choice_elements() {
        let reg = registry();
        let types = reg.choice_types("Observation", "value").unwrap();
        assert!(types.contains(&"Quantity".to_string()));
        assert!(types.contains(&"string".to_string()));
        assert!(reg.choice_types("Observation", "status").is_none());

        let concrete = reg.element("Observation", "valueQuantity").unwrap();
        assert_eq!(concrete.single_type(), Some("Quantity"));
    }

    #[test]
    fn test_structural_elements() {
        let reg = registry();
        assert!(reg.is_structural_element("HumanName"));
        assert!(reg.is_structural_element("Patient.contact"));
        assert!(reg.is_structural_element("Patient.name"));
        assert!(!reg.is_structural_element("Patient"));
        assert!(!reg.is_structural_element("Patient.gender"));
        assert!(!reg.is_structural_element("string"));
    }

    #[test]
    fn test_profile_base() {
        let reg = registry();
        assert_eq!(reg.get_profile_base_type("bp").as_deref(), Some("Observation"));
        assert_eq!(
            reg.get_profile_base_type("http://hl7.org/fhir/StructureDefinition/bodyweight")
                .as_deref(),
            Some("Observation")
        );
        assert_eq!(reg.get_profile_base_type("Patient"), None);
    }

    #[test]
    fn test_primitive_json_kind_follows_hierarchy() {
        let reg = registry();
        assert_eq!(reg.primitive_json_kind("code"), Some(JsonKind::String));
        assert_eq!(reg.primitive_json_kind("System.Integer"), Some(JsonKind::Integer));
        assert_eq!(reg.primitive_json_kind("Quantity"), None);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let yaml = r#"
types:
  - { name: A, kind: complex-type, base: B }
  - { name: B, kind: complex-type, base: A }
"#;
        let def = SchemaDefinition::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            TypeRegistry::from_definition(def),
            Err(TypeRegistryError::HierarchyCycle { .. })
        ));
    }

    #[test]
    fn test_unknown_base_is_rejected() {
        let yaml = r#"
types:
  - { name: A, kind: complex-type, base: Missing }
"#;
        let def = SchemaDefinition::from_yaml_str(yaml).unwrap();
        let err = TypeRegistry::from_definition(def).unwrap_err();
        assert!(err.is_load_error());
    }
}
