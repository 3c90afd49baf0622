//! Per-record-kind schema descriptors
//!
//! Every record kind participating in the ledger declares its fields up
//! front: which are plain values, which are links, and which carry ordered
//! media. The relationship codec, the media tracker and the index hook all
//! consult the registry instead of inspecting rows at runtime.

use std::collections::HashMap;

use crate::error::StudioError;

/// What a declared field holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Scalar value stored in the record's field map
    Value {
        /// Unique values are suffixed on copy so snapshots never collide
        unique: bool,
    },
    /// Optional one-to-one link
    SingleLink {
        /// Field on the linked record that points back, if any
        reciprocal: Option<String>,
    },
    /// Owned to-many collection (foreign-key inverse)
    ToMany,
    /// Many-to-many field carrying both relationships and references
    ManyToMany,
    /// Ordered media attachment list; the field name is the media kind
    Media,
}

/// A single declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDef {
    pub fn value(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Value { unique: false },
        }
    }

    pub fn unique_value(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Value { unique: true },
        }
    }

    pub fn single_link(name: &str, reciprocal: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::SingleLink {
                reciprocal: reciprocal.map(str::to_string),
            },
        }
    }

    pub fn to_many(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::ToMany,
        }
    }

    pub fn many_to_many(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::ManyToMany,
        }
    }

    pub fn media(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Media,
        }
    }

    /// Relational fields get an entry in the relationship map; media and
    /// plain values do not.
    pub fn is_relational(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::SingleLink { .. } | FieldKind::ToMany | FieldKind::ManyToMany
        )
    }
}

/// Schema descriptor for one record kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    /// Kind name, e.g. "article"
    pub kind: String,
    /// Field name under which other records' maps point back at this kind
    pub related_name: String,
    /// Whether live-store writes of this kind reach the search index
    pub indexable: bool,
    pub fields: Vec<FieldDef>,
}

impl RecordSchema {
    pub fn new(kind: &str, related_name: &str, fields: Vec<FieldDef>) -> Self {
        Self {
            kind: kind.to_string(),
            related_name: related_name.to_string(),
            indexable: true,
            fields,
        }
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relational_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_relational())
    }

    pub fn media_kinds(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::Media)
            .map(|f| f.name.as_str())
    }

    pub fn unique_value_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Value { unique: true }))
            .map(|f| f.name.as_str())
    }
}

/// Registry of every record kind known to the stores
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, RecordSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: RecordSchema) {
        self.schemas.insert(schema.kind.clone(), schema);
    }

    pub fn get(&self, kind: &str) -> Result<&RecordSchema, StudioError> {
        self.schemas
            .get(kind)
            .ok_or_else(|| StudioError::UnknownKind(kind.to_string()))
    }

    pub fn is_indexable(&self, kind: &str) -> bool {
        self.schemas.get(kind).map(|s| s.indexable).unwrap_or(false)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article() -> RecordSchema {
        RecordSchema::new(
            "article",
            "articles",
            vec![
                FieldDef::value("title"),
                FieldDef::unique_value("slug"),
                FieldDef::single_link("profile", Some("article")),
                FieldDef::to_many("sections"),
                FieldDef::many_to_many("topics"),
                FieldDef::media("images"),
            ],
        )
    }

    #[test]
    fn test_field_lookup() {
        let schema = article();
        assert!(schema.field_def("slug").is_some());
        assert!(schema.field_def("missing").is_none());
    }

    #[test]
    fn test_field_partitions() {
        let schema = article();
        let relational: Vec<_> = schema.relational_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(relational, vec!["profile", "sections", "topics"]);
        assert_eq!(schema.media_kinds().collect::<Vec<_>>(), vec!["images"]);
        assert_eq!(schema.unique_value_fields().collect::<Vec<_>>(), vec!["slug"]);
    }

    #[test]
    fn test_registry_unknown_kind() {
        let mut registry = SchemaRegistry::new();
        registry.register(article());
        assert!(registry.get("article").is_ok());
        assert!(matches!(
            registry.get("missing"),
            Err(StudioError::UnknownKind(_))
        ));
        assert!(!registry.is_indexable("missing"));
    }
}
