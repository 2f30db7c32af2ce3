pub mod operators;
pub mod tree;
pub mod values;

pub use self::operators::{FilterOp, SortOrder};
pub use self::tree::{
    ActionTree, DEFAULT_LIMIT, FieldPath, FilterAction, NestedField, Selection, Selector,
    SortAction,
};
pub use self::values::Value;
