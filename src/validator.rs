//! Semantic validation of an action tree against the schema registry.
//!
//! Depth-first; the first violation wins. The tree is never modified.

use strsim::levenshtein;

use crate::ast::{ActionTree, FieldPath, FilterAction, FilterOp, Selector, Value};
use crate::error::{TreeqlError, TreeqlResult};
use crate::schema::{Entity, Registry};

/// Check `tree` against `entity` and everything reachable from it.
pub fn validate(tree: &ActionTree, entity: &Entity, registry: &Registry) -> TreeqlResult<()> {
    for selector in tree.select.selectors() {
        match selector {
            Selector::Wildcard => {}
            Selector::Field(alias) | Selector::Exclude(alias) => check_field(entity, alias)?,
        }
    }

    for (alias, child) in &tree.relations {
        let target = target_of(entity, alias, registry)?;
        validate(child, target, registry)?;
    }

    for filter in &tree.filters {
        check_filter_path(entity, &filter.field, registry)?;
        check_operand(filter)?;
    }

    if let Some(sort) = &tree.sort {
        check_field(entity, &sort.field)?;
    }

    Ok(())
}

fn check_field(entity: &Entity, alias: &str) -> TreeqlResult<()> {
    if entity.resolve_field(alias).is_some() {
        return Ok(());
    }
    if entity.relationship(alias).is_some() {
        return Err(TreeqlError::validation(format!(
            "'{}' is a relation of '{}', select it as {}(...)",
            alias, entity.name, alias
        )));
    }
    let aliases: Vec<&str> = entity.fields().iter().map(|f| f.alias.as_str()).collect();
    Err(unknown("field", alias, entity, &aliases))
}

fn target_of<'r>(entity: &Entity, alias: &str, registry: &'r Registry) -> TreeqlResult<&'r Entity> {
    let Some(rel) = entity.relationship(alias) else {
        let aliases: Vec<&str> = entity.relationships().keys().map(String::as_str).collect();
        return Err(unknown("relation", alias, entity, &aliases));
    };
    registry.entity(&rel.target).ok_or_else(|| {
        TreeqlError::Schema(format!(
            "relationship '{}.{}' targets unknown entity '{}'",
            entity.name, alias, rel.target
        ))
    })
}

/// Walk a dotted path: every segment but the last is a relation.
fn check_filter_path(entity: &Entity, path: &FieldPath, registry: &Registry) -> TreeqlResult<()> {
    match path {
        FieldPath::Plain(alias) => check_field(entity, alias),
        FieldPath::Nested(nested) => {
            let target = target_of(entity, nested.head(), registry)?;
            check_filter_path(target, &nested.shift_down(), registry)
        }
    }
}

fn check_operand(filter: &FilterAction) -> TreeqlResult<()> {
    let op = filter.operator;
    let value = &filter.value;

    let problem = match op {
        _ if op.is_ordering() && (value.is_string() || value.is_list()) => {
            Some(format!("'{}' cannot compare a {}", op, value.type_name()))
        }
        _ if op.is_pattern() && !value.is_string() => Some(format!(
            "'{}' needs a string pattern, got {}",
            op,
            value.type_name()
        )),
        FilterOp::Eq | FilterOp::Ne if value.is_list() => {
            Some(format!("'{}' cannot compare against a list, use 'in'", op))
        }
        FilterOp::In => mixed_list(value),
        FilterOp::IsNull if !matches!(value, Value::Int(_)) => Some(format!(
            "'is_null' takes 1 or 0, got {}",
            value.type_name()
        )),
        _ => None,
    };

    match problem {
        Some(problem) => Err(TreeqlError::validation(format!(
            "filter '{}': {}",
            filter, problem
        ))),
        None => Ok(()),
    }
}

/// `in` lists must hold one runtime type throughout.
fn mixed_list(value: &Value) -> Option<String> {
    let Value::List(items) = value else {
        return None;
    };
    let first = items.first()?.type_name();
    items
        .iter()
        .map(Value::type_name)
        .find(|t| *t != first)
        .map(|other| format!("list mixes {} and {} values", first, other))
}

fn unknown(what: &str, alias: &str, entity: &Entity, candidates: &[&str]) -> TreeqlError {
    match did_you_mean(alias, candidates) {
        Some(sugg) => TreeqlError::validation(format!(
            "unknown {} '{}' on '{}'. Did you mean '{}'?",
            what, alias, entity.name, sugg
        )),
        None => TreeqlError::validation(format!(
            "unknown {} '{}' on '{}'",
            what, alias, entity.name
        )),
    }
}

/// Best candidate within a length-dependent Levenshtein distance.
fn did_you_mean(input: &str, candidates: &[&str]) -> Option<String> {
    let threshold = match input.len() {
        0..=2 => 0,
        3..=5 => 2,
        _ => 3,
    };

    candidates
        .iter()
        .map(|cand| (levenshtein(input, cand), *cand))
        .filter(|(dist, _)| *dist <= threshold)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, cand)| cand.to_string())
}
