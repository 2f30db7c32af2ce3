//! Per-level query plan.
//!
//! Resolves selectors into concrete fields, pushes dotted filters down into
//! the relation they start with, and decides how each relation is joined.
//! Works on a copy; the caller's tree is left alone.

use crate::ast::{ActionTree, FieldPath, FilterAction, FilterOp, Selection, Selector, SortOrder, Value};
use crate::error::{TreeqlError, TreeqlResult};
use crate::schema::{Entity, FieldDef, Registry, Relationship};
use crate::sql::JoinKind;

/// A filter on a column of the level's own table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter<'r> {
    pub field: &'r FieldDef,
    pub operator: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelPlan<'r> {
    pub entity: &'r Entity,
    /// `false` for levels joined only to evaluate filters.
    pub output: bool,
    /// Output fields in document order.
    pub fields: Vec<&'r FieldDef>,
    pub filters: Vec<ColumnFilter<'r>>,
    pub sort: Option<(&'r FieldDef, SortOrder)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub relations: Vec<RelationPlan<'r>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationPlan<'r> {
    pub alias: String,
    pub relationship: &'r Relationship,
    pub join: JoinKind,
    pub level: LevelPlan<'r>,
}

/// Plan `tree` as a level of `entity`.
pub fn plan<'r>(
    tree: &ActionTree,
    entity: &'r Entity,
    registry: &'r Registry,
) -> TreeqlResult<LevelPlan<'r>> {
    plan_level(tree.clone(), entity, registry)
}

fn plan_level<'r>(
    mut tree: ActionTree,
    entity: &'r Entity,
    registry: &'r Registry,
) -> TreeqlResult<LevelPlan<'r>> {
    let mut pushed: Vec<String> = Vec::new();
    let mut filters = Vec::new();

    for filter in std::mem::take(&mut tree.filters) {
        match filter.field {
            FieldPath::Plain(alias) => filters.push(ColumnFilter {
                field: resolve(entity, &alias)?,
                operator: filter.operator,
                value: filter.value,
            }),
            FieldPath::Nested(nested) => {
                let head = nested.head().to_string();
                tree.relation_mut(&head).add_filter(FilterAction::new(
                    nested.shift_down(),
                    filter.operator,
                    filter.value,
                ));
                if !pushed.contains(&head) {
                    pushed.push(head);
                }
            }
        }
    }

    let fields = resolve_fields(&tree.select, entity)?;
    let sort = match &tree.sort {
        Some(sort) => Some((resolve(entity, &sort.field)?, sort.order)),
        None => None,
    };

    let mut relations = Vec::with_capacity(tree.relations.len());
    for (alias, child) in tree.relations {
        let relationship = entity.relationship(&alias).ok_or_else(|| {
            TreeqlError::validation(format!(
                "unknown relation '{}' on '{}'",
                alias, entity.name
            ))
        })?;
        let target = registry.entity(&relationship.target).ok_or_else(|| {
            TreeqlError::Schema(format!(
                "relationship '{}.{}' targets unknown entity '{}'",
                entity.name, alias, relationship.target
            ))
        })?;
        let level = plan_level(child, target, registry)?;
        if !pushed.contains(&alias) {
            relations.push(RelationPlan {
                alias,
                relationship,
                join: JoinKind::LeftOuter,
                level,
            });
        } else if level.output && level.is_paginated() {
            // Paging shapes the output only; the unpaged gate decides which parents match.
            relations.push(RelationPlan {
                alias: alias.clone(),
                relationship,
                join: JoinKind::Inner,
                level: level.gate(),
            });
            relations.push(RelationPlan {
                alias,
                relationship,
                join: JoinKind::LeftOuter,
                level,
            });
        } else {
            relations.push(RelationPlan {
                alias,
                relationship,
                join: JoinKind::Inner,
                level,
            });
        }
    }

    Ok(LevelPlan {
        entity,
        output: tree.select.is_output(),
        fields,
        filters,
        sort,
        limit: tree.limit,
        offset: tree.offset,
        relations,
    })
}

impl<'r> LevelPlan<'r> {
    /// An explicit limit or offset asks for per-parent paging.
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some_and(|n| n > 0) || self.offset.is_some_and(|n| n > 0)
    }

    /// The same filters without output or paging, keeping only the joins
    /// that restrict rows.
    fn gate(&self) -> LevelPlan<'r> {
        LevelPlan {
            entity: self.entity,
            output: false,
            fields: Vec::new(),
            filters: self.filters.clone(),
            sort: None,
            limit: None,
            offset: None,
            relations: self
                .relations
                .iter()
                .filter(|r| r.join == JoinKind::Inner)
                .map(|r| RelationPlan {
                    alias: r.alias.clone(),
                    relationship: r.relationship,
                    join: JoinKind::Inner,
                    level: r.level.gate(),
                })
                .collect(),
        }
    }
}

fn resolve<'r>(entity: &'r Entity, alias: &str) -> TreeqlResult<&'r FieldDef> {
    entity.resolve_field(alias).ok_or_else(|| {
        TreeqlError::validation(format!("unknown field '{}' on '{}'", alias, entity.name))
    })
}

/// `*` expands to every field minus exclusions; otherwise plain fields in
/// order of appearance and exclusions have nothing to remove from.
fn resolve_fields<'r>(select: &Selection, entity: &'r Entity) -> TreeqlResult<Vec<&'r FieldDef>> {
    let selectors = select.selectors();

    if selectors.contains(&Selector::Wildcard) {
        let excluded: Vec<&str> = selectors
            .iter()
            .filter_map(|s| match s {
                Selector::Exclude(alias) => Some(alias.as_str()),
                _ => None,
            })
            .collect();
        return Ok(entity
            .fields()
            .iter()
            .filter(|f| !excluded.contains(&f.alias.as_str()))
            .collect());
    }

    let mut fields: Vec<&FieldDef> = Vec::new();
    for selector in selectors {
        if let Selector::Field(alias) = selector {
            let field = resolve(entity, alias)?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
    }
    Ok(fields)
}
