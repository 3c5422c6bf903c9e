//! Mapped-type metadata
//!
//! A persistence context describes its mapped entity types with
//! [`SchemaMetadata`]. Besides the property list and primary key, each type
//! and property carries the declarative audit markers that seed the audit
//! policy:
//!
//! - a type-level `auditable` marker,
//! - a property-level `auditable` marker,
//! - a property-level `not_auditable` marker.
//!
//! Navigation (relationship) properties are listed so that the policy can
//! exclude them explicitly; they never hold scalar values.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Kind of a mapped property
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// Column-backed scalar property
    #[default]
    Scalar,
    /// Relationship to another entity or collection of entities
    Navigation,
}

/// Metadata of one mapped property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMetadata {
    /// Property name
    pub name: String,
    /// Scalar or navigation
    #[serde(default)]
    pub kind: PropertyKind,
    /// Explicit `auditable` marker
    #[serde(default)]
    pub auditable: bool,
    /// Explicit `not auditable` marker
    #[serde(default)]
    pub not_auditable: bool,
}

impl PropertyMetadata {
    /// A scalar property without markers
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Scalar,
            auditable: false,
            not_auditable: false,
        }
    }

    /// A navigation property
    pub fn navigation(name: impl Into<String>) -> Self {
        Self {
            kind: PropertyKind::Navigation,
            ..Self::scalar(name)
        }
    }

    /// Marks the property as auditable
    pub fn auditable(mut self) -> Self {
        self.auditable = true;
        self
    }

    /// Marks the property as not auditable
    pub fn not_auditable(mut self) -> Self {
        self.not_auditable = true;
        self
    }

    /// Returns true for navigation properties
    pub fn is_navigation(&self) -> bool {
        self.kind == PropertyKind::Navigation
    }
}

/// Metadata of one mapped entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeMetadata {
    /// Entity type name, as reported by tracked entries
    pub name: String,
    /// Type-level `auditable` marker
    #[serde(default)]
    pub auditable: bool,
    /// Primary key columns in declaration order
    pub key: Vec<String>,
    /// Properties in declaration order
    pub properties: Vec<PropertyMetadata>,
}

impl EntityTypeMetadata {
    /// Creates a type with no markers, keys or properties
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auditable: false,
            key: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Marks the type as auditable
    pub fn auditable(mut self) -> Self {
        self.auditable = true;
        self
    }

    /// Appends a key column; the column is also added as a scalar property
    /// if not already declared
    pub fn key(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if self.property(&column).is_none() {
            self.properties.push(PropertyMetadata::scalar(column.clone()));
        }
        self.key.push(column);
        self
    }

    /// Appends or replaces a property declaration
    pub fn with_property(mut self, property: PropertyMetadata) -> Self {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
        self
    }

    /// Looks up a property by name
    pub fn property(&self, name: &str) -> Option<&PropertyMetadata> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Iterates over scalar (non-navigation) properties in declaration order
    pub fn scalar_properties(&self) -> impl Iterator<Item = &PropertyMetadata> {
        self.properties.iter().filter(|p| !p.is_navigation())
    }

    /// Checks that the key is non-empty and refers to scalar properties
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.key.is_empty() {
            return Err(DomainError::MissingKey(self.name.clone()));
        }
        for column in &self.key {
            match self.property(column) {
                Some(p) if !p.is_navigation() => {}
                _ => {
                    return Err(DomainError::UnknownKeyProperty {
                        entity_type: self.name.clone(),
                        property: column.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// Metadata of every entity type mapped by a persistence context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// Mapped entity types in registration order
    pub entity_types: Vec<EntityTypeMetadata>,
}

impl SchemaMetadata {
    /// Creates an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of an entity type
    pub fn with_entity(mut self, entity_type: EntityTypeMetadata) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    /// Looks up an entity type by name
    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeMetadata> {
        self.entity_types.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> EntityTypeMetadata {
        EntityTypeMetadata::new("Company")
            .auditable()
            .key("id")
            .with_property(PropertyMetadata::scalar("name"))
            .with_property(PropertyMetadata::scalar("phone").not_auditable())
            .with_property(PropertyMetadata::navigation("employees"))
    }

    #[test]
    fn test_key_registers_scalar_property() {
        let ty = company();
        assert_eq!(ty.key, vec!["id".to_string()]);
        assert!(ty.property("id").is_some());
        assert!(ty.validate().is_ok());
    }

    #[test]
    fn test_scalar_properties_skip_navigation() {
        let ty = company();
        let names: Vec<&str> = ty
            .scalar_properties()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "name", "phone"]);
    }

    #[test]
    fn test_with_property_replaces_declaration() {
        let ty = company().with_property(PropertyMetadata::scalar("phone"));
        assert!(!ty.property("phone").unwrap().not_auditable);
        assert_eq!(ty.properties.len(), 4);
    }

    #[test]
    fn test_validate_rejects_missing_key() {
        let ty = EntityTypeMetadata::new("Orphan").with_property(PropertyMetadata::scalar("x"));
        assert_eq!(
            ty.validate(),
            Err(DomainError::MissingKey("Orphan".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_navigation_key() {
        let mut ty = company();
        ty.key = vec!["employees".to_string()];
        assert!(matches!(
            ty.validate(),
            Err(DomainError::UnknownKeyProperty { .. })
        ));
    }

    #[test]
    fn test_schema_deserializes_from_yaml() {
        let yaml = r#"
entity_types:
  - name: Company
    auditable: true
    key: [id]
    properties:
      - name: id
      - name: name
      - name: phone
        not_auditable: true
      - name: employees
        kind: navigation
"#;
        let schema: SchemaMetadata = serde_yaml::from_str(yaml).unwrap();
        let ty = schema.entity_type("Company").unwrap();
        assert!(ty.auditable);
        assert!(ty.property("phone").unwrap().not_auditable);
        assert!(ty.property("employees").unwrap().is_navigation());
        assert!(schema.entity_type("Missing").is_none());
    }
}
