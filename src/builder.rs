//! Reduce a `SyntaxTree` to an `ActionTree`.
//!
//! Sibling fields collapse into one level, relation nodes are filed under
//! their alias (repeats merge), and modifiers are folded by kind.

use crate::ast::{ActionTree, FieldPath, FilterAction, Selection, Selector, SortAction};
use crate::error::{TreeqlError, TreeqlResult};
use crate::syntax::{FieldNode, Modifier, SyntaxTree};

/// Build the root action tree.
pub fn build(syntax: SyntaxTree) -> TreeqlResult<ActionTree> {
    build_level(syntax, None)
}

fn build_level(syntax: SyntaxTree, name: Option<String>) -> TreeqlResult<ActionTree> {
    let mut tree = ActionTree {
        name,
        ..ActionTree::new()
    };

    let mut selectors = Vec::new();
    for field in syntax.fields {
        match field {
            FieldNode::Name(alias) => push_unique(&mut selectors, Selector::Field(alias)),
            FieldNode::Bang(alias) => push_unique(&mut selectors, Selector::Exclude(alias)),
            FieldNode::Star => push_unique(&mut selectors, Selector::Wildcard),
            FieldNode::Relation { name, tree: child } => {
                let child = build_level(child, Some(name))?;
                tree.merge_relation(child);
            }
        }
    }
    tree.select = Selection::Fields(selectors);

    for modifier in syntax.modifiers {
        match modifier {
            Modifier::Filter { path, op, value } => {
                let field = FieldPath::from_segments(path)
                    .ok_or_else(|| TreeqlError::validation("filter without a field"))?;
                tree.add_filter(FilterAction::new(field, op, value));
            }
            Modifier::Order { field, order } => tree.sort = Some(SortAction { field, order }),
            Modifier::Limit(n) => tree.limit = Some(n),
            Modifier::Offset(n) => tree.offset = Some(n),
        }
    }

    Ok(tree)
}

fn push_unique(selectors: &mut Vec<Selector>, selector: Selector) {
    if !selectors.contains(&selector) {
        selectors.push(selector);
    }
}
