//! The action tree: one node per entity level of a query.
//!
//! ```text
//! ActionTree
//!   |- select     id, *, !comment
//!   |- filters    priority>=2 | slaves.details.info="x"
//!   |- sort       created_at desc
//!   |- limit / offset
//!   |- relations  alias -> ActionTree
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::operators::{FilterOp, SortOrder};
use super::values::Value;

/// Page size of the root level when the query does not say otherwise.
pub const DEFAULT_LIMIT: u64 = 20;

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    /// `alias`
    Field(String),
    /// `*`
    Wildcard,
    /// `!alias`
    Exclude(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Field(name) => write!(f, "{}", name),
            Selector::Wildcard => write!(f, "*"),
            Selector::Exclude(name) => write!(f, "!{}", name),
        }
    }
}

/// What a level contributes to the output document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    /// Selectors in order of appearance.
    Fields(Vec<Selector>),
    /// No own fields: the level is joined only to evaluate filters.
    FilterOnly,
}

impl Selection {
    pub fn selectors(&self) -> &[Selector] {
        match self {
            Selection::Fields(selectors) => selectors,
            Selection::FilterOnly => &[],
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Selection::Fields(_))
    }
}

impl Default for Selection {
    fn default() -> Self {
        Selection::Fields(Vec::new())
    }
}

/// A dotted path of two or more segments: `relation.subrelation.field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct NestedField {
    segments: Vec<String>,
}

impl NestedField {
    /// Returns `None` for paths shorter than two segments.
    pub fn new(segments: Vec<String>) -> Option<Self> {
        (segments.len() >= 2).then_some(Self { segments })
    }

    /// The relation this path starts with.
    pub fn head(&self) -> &str {
        &self.segments[0]
    }

    /// Drop the first segment.
    pub fn shift_down(&self) -> FieldPath {
        let rest = &self.segments[1..];
        if rest.len() == 1 {
            FieldPath::Plain(rest[0].clone())
        } else {
            FieldPath::Nested(NestedField {
                segments: rest.to_vec(),
            })
        }
    }
}

impl TryFrom<Vec<String>> for NestedField {
    type Error = String;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        let path = segments.join(".");
        Self::new(segments).ok_or_else(|| format!("'{}' is not a dotted path", path))
    }
}

impl From<NestedField> for Vec<String> {
    fn from(nested: NestedField) -> Self {
        nested.segments
    }
}

impl std::fmt::Display for NestedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// The left-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldPath {
    Plain(String),
    Nested(NestedField),
}

impl FieldPath {
    /// Build from parsed segments; a single segment is a plain alias.
    pub fn from_segments(mut segments: Vec<String>) -> Option<Self> {
        match segments.len() {
            0 => None,
            1 => segments.pop().map(FieldPath::Plain),
            _ => NestedField::new(segments).map(FieldPath::Nested),
        }
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldPath::Plain(name) => write!(f, "{}", name),
            FieldPath::Nested(nested) => write!(f, "{}", nested),
        }
    }
}

/// `.filter(field OP value)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterAction {
    pub field: FieldPath,
    pub operator: FilterOp,
    pub value: Value,
}

impl FilterAction {
    pub fn new(field: FieldPath, operator: FilterOp, value: Value) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }
}

impl std::fmt::Display for FilterAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operator {
            FilterOp::In | FilterOp::IsNull | FilterOp::Like | FilterOp::ILike => {
                write!(f, "{} {} {}", self.field, self.operator, self.value)
            }
            _ => write!(f, "{}{}{}", self.field, self.operator, self.value),
        }
    }
}

/// `.order(field, asc|desc)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortAction {
    pub field: String,
    pub order: SortOrder,
}

/// One entity level of a query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionTree {
    /// Relation alias this subtree was reached through; `None` at the root.
    pub name: Option<String>,
    pub select: Selection,
    pub filters: Vec<FilterAction>,
    pub sort: Option<SortAction>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub relations: IndexMap<String, ActionTree>,
}

impl ActionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A relation subtree that exists only to carry filters.
    pub fn filter_only(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            select: Selection::FilterOnly,
            ..Self::default()
        }
    }

    /// Append a filter unless a structurally equal one is already present.
    pub fn add_filter(&mut self, filter: FilterAction) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    /// File `child` under its name, merging with an existing subtree.
    pub fn merge_relation(&mut self, child: ActionTree) {
        let name = child.name.clone().unwrap_or_default();
        match self.relations.get_mut(&name) {
            Some(existing) => existing.absorb(child),
            None => {
                self.relations.insert(name, child);
            }
        }
    }

    /// Get the subtree for `name`, creating a filter-only one if needed.
    pub fn relation_mut(&mut self, name: &str) -> &mut ActionTree {
        self.relations
            .entry(name.to_string())
            .or_insert_with(|| ActionTree::filter_only(name))
    }

    fn absorb(&mut self, other: ActionTree) {
        if let Selection::Fields(theirs) = other.select {
            match &mut self.select {
                Selection::Fields(mine) => {
                    for selector in theirs {
                        if !mine.contains(&selector) {
                            mine.push(selector);
                        }
                    }
                }
                filter_only => *filter_only = Selection::Fields(theirs),
            }
        }
        for filter in other.filters {
            self.add_filter(filter);
        }
        if other.sort.is_some() {
            self.sort = other.sort;
        }
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        if other.offset.is_some() {
            self.offset = other.offset;
        }
        for (_, child) in other.relations {
            self.merge_relation(child);
        }
    }

    pub fn is_root(&self) -> bool {
        self.name.is_none()
    }
}
