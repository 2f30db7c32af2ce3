//! Schema registry.
//!
//! Describes the entities a query may touch: their table, identity column,
//! field aliases and relationships. Built once (from TOML or in code) and
//! shared read-only.
//!
//! ```toml
//! [[entity]]
//! name = "todo"
//! table = "todo"
//! fields = ["id", { name = "comment", alias = "instruction" }]
//!
//! [[entity.relationship]]
//! alias = "slaves"
//! target = "todo_slave"
//! direction = "to-many"
//! on = "todo.id = todoslave.todo_id"
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{TreeqlError, TreeqlResult};

/// Cardinality of a relationship, seen from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    ToOne,
    ToMany,
    /// Describable, but not compilable: there is no association table support.
    ManyToMany,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ToOne => write!(f, "to-one"),
            Direction::ToMany => write!(f, "to-many"),
            Direction::ManyToMany => write!(f, "many-to-many"),
        }
    }
}

/// A column exposed under a public alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    /// Column name in the table.
    pub name: String,
    /// Name used in query text and in the output document.
    pub alias: String,
}

impl FieldDef {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
        }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
        }
    }
}

/// Edge from a parent entity to a target entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub target: String,
    pub direction: Direction,
    /// Join column on the parent's table.
    pub parent_column: String,
    /// Join column on the target's table.
    pub child_column: String,
}

impl Relationship {
    pub fn new(
        target: impl Into<String>,
        direction: Direction,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            direction,
            parent_column: parent_column.into(),
            child_column: child_column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub name: String,
    pub table: String,
    /// Column that identifies a row; used for default ordering and grouping.
    pub identity: String,
    fields: Vec<FieldDef>,
    relationships: IndexMap<String, Relationship>,
}

impl Entity {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            identity: "id".to_string(),
            fields: Vec::new(),
            relationships: IndexMap::new(),
        }
    }

    pub fn identity(mut self, column: impl Into<String>) -> Self {
        self.identity = column.into();
        self
    }

    /// Expose a column under its own name.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(FieldDef::new(name));
        self
    }

    /// Expose a column under a different name.
    pub fn aliased_field(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.fields.push(FieldDef::aliased(name, alias));
        self
    }

    pub fn with_relationship(mut self, alias: impl Into<String>, rel: Relationship) -> Self {
        self.relationships.insert(alias.into(), rel);
        self
    }

    pub fn to_one(
        self,
        alias: impl Into<String>,
        target: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        self.with_relationship(
            alias,
            Relationship::new(target, Direction::ToOne, parent_column, child_column),
        )
    }

    pub fn to_many(
        self,
        alias: impl Into<String>,
        target: impl Into<String>,
        parent_column: impl Into<String>,
        child_column: impl Into<String>,
    ) -> Self {
        self.with_relationship(
            alias,
            Relationship::new(target, Direction::ToMany, parent_column, child_column),
        )
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn relationships(&self) -> &IndexMap<String, Relationship> {
        &self.relationships
    }

    pub fn resolve_field(&self, alias: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.alias == alias)
    }

    pub fn relationship(&self, alias: &str) -> Option<&Relationship> {
        self.relationships.get(alias)
    }
}

/// All entities, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Registry {
    entities: IndexMap<String, Entity>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entity: Entity) {
        self.entities.insert(entity.name.clone(), entity);
    }

    /// Builder-style `add`.
    pub fn with(mut self, entity: Entity) -> Self {
        self.add(entity);
        self
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Like `entity`, but an unknown name is a client error.
    pub fn require(&self, name: &str) -> TreeqlResult<&Entity> {
        self.entity(name)
            .ok_or_else(|| TreeqlError::validation(format!("unknown entity '{}'", name)))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Every relationship target exists and no alias is both a field and a relationship.
    pub fn check(&self) -> TreeqlResult<()> {
        for entity in self.entities.values() {
            for (alias, rel) in &entity.relationships {
                if !self.entities.contains_key(&rel.target) {
                    return Err(TreeqlError::Schema(format!(
                        "relationship '{}.{}' targets unknown entity '{}'",
                        entity.name, alias, rel.target
                    )));
                }
                if entity.resolve_field(alias).is_some() {
                    return Err(TreeqlError::Schema(format!(
                        "'{}.{}' is declared both as a field and as a relationship",
                        entity.name, alias
                    )));
                }
            }
        }
        Ok(())
    }

    /// Load a registry from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> TreeqlResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TreeqlError::Schema(format!("failed to read {}: {}", path.display(), e))
        })?;
        let registry = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded {} entities from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Parse a registry from TOML text and check its consistency.
    pub fn from_toml_str(content: &str) -> TreeqlResult<Self> {
        let file: SchemaFile = toml::from_str(content)
            .map_err(|e| TreeqlError::Schema(format!("failed to parse schema: {}", e)))?;

        let tables: IndexMap<&str, &str> = file
            .entity
            .iter()
            .map(|e| (e.name.as_str(), e.table.as_deref().unwrap_or(&e.name)))
            .collect();

        let mut registry = Registry::new();
        for raw in &file.entity {
            let table = raw.table.as_deref().unwrap_or(&raw.name);
            let mut entity = Entity::new(&raw.name, table);
            if let Some(identity) = &raw.identity {
                entity.identity = identity.clone();
            }
            for field in &raw.fields {
                entity.fields.push(match field {
                    FieldSpec::Plain(name) => FieldDef::new(name),
                    FieldSpec::Aliased { name, alias } => match alias {
                        Some(alias) => FieldDef::aliased(name, alias),
                        None => FieldDef::new(name),
                    },
                });
            }
            for rel in &raw.relationship {
                let target_table = tables.get(rel.target.as_str()).ok_or_else(|| {
                    TreeqlError::Schema(format!(
                        "relationship '{}.{}' targets unknown entity '{}'",
                        raw.name, rel.alias, rel.target
                    ))
                })?;
                let (parent_column, child_column) =
                    split_join(&rel.on, table, target_table).map_err(|msg| {
                        TreeqlError::Schema(format!(
                            "relationship '{}.{}': {}",
                            raw.name, rel.alias, msg
                        ))
                    })?;
                tracing::debug!(
                    "{}.{} -> {} ({}) on {} = {}",
                    raw.name,
                    rel.alias,
                    rel.target,
                    rel.direction,
                    parent_column,
                    child_column
                );
                entity.relationships.insert(
                    rel.alias.clone(),
                    Relationship::new(&rel.target, rel.direction, parent_column, child_column),
                );
            }
            registry.add(entity);
        }

        registry.check()?;
        Ok(registry)
    }
}

/// Work out which side of `a.x = b.y` belongs to the parent table.
///
/// For self-references both sides match; the left one is the parent.
fn split_join(on: &str, parent_table: &str, target_table: &str) -> Result<(String, String), String> {
    let (left, right) = on
        .split_once('=')
        .ok_or_else(|| format!("join condition '{}' is not of the form a.x = b.y", on))?;
    let left = split_column(left.trim())?;
    let right = split_column(right.trim())?;

    if left.0 == parent_table && right.0 == target_table {
        Ok((left.1.to_string(), right.1.to_string()))
    } else if right.0 == parent_table && left.0 == target_table {
        Ok((right.1.to_string(), left.1.to_string()))
    } else {
        Err(format!(
            "join condition '{}' does not connect tables '{}' and '{}'",
            on, parent_table, target_table
        ))
    }
}

fn split_column(side: &str) -> Result<(&str, &str), String> {
    match side.split_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => {
            Ok((table.trim(), column.trim()))
        }
        _ => Err(format!("expected table.column, found '{}'", side)),
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    entity: Vec<EntitySpec>,
}

#[derive(Debug, Deserialize)]
struct EntitySpec {
    name: String,
    /// Defaults to the entity name.
    table: Option<String>,
    identity: Option<String>,
    #[serde(default)]
    fields: Vec<FieldSpec>,
    #[serde(default)]
    relationship: Vec<RelationshipSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldSpec {
    Plain(String),
    Aliased { name: String, alias: Option<String> },
}

#[derive(Debug, Deserialize)]
struct RelationshipSpec {
    alias: String,
    target: String,
    direction: Direction,
    on: String,
}
