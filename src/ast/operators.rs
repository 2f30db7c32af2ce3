use serde::{Deserialize, Serialize};

/// Sort order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse the keyword used inside `.order(field, asc|desc)`.
    pub fn from_keyword(kw: &str) -> Option<Self> {
        match kw {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    /// Greater than or equal (>=)
    Gte,
    /// Greater than (>)
    Gt,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Lte,
    /// Equal (=)
    Eq,
    /// Not equal (!=)
    Ne,
    /// Membership in a list (in)
    In,
    /// NULL check (is_null), the value is a 1/0 flag
    IsNull,
    /// LIKE pattern match
    Like,
    /// Case-insensitive LIKE
    ILike,
}

impl FilterOp {
    /// Operators spelled as words in the query text.
    pub fn from_keyword(kw: &str) -> Option<Self> {
        match kw {
            "in" => Some(FilterOp::In),
            "is_null" => Some(FilterOp::IsNull),
            "like" => Some(FilterOp::Like),
            "ilike" => Some(FilterOp::ILike),
            _ => None,
        }
    }

    /// Operators spelled as symbols in the query text.
    pub fn from_symbol(sym: &str) -> Option<Self> {
        match sym {
            ">=" => Some(FilterOp::Gte),
            ">" => Some(FilterOp::Gt),
            "<" => Some(FilterOp::Lt),
            "<=" => Some(FilterOp::Lte),
            "=" => Some(FilterOp::Eq),
            "!=" => Some(FilterOp::Ne),
            _ => None,
        }
    }

    /// `>=`, `>`, `<`, `<=`
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            FilterOp::Gte | FilterOp::Gt | FilterOp::Lt | FilterOp::Lte
        )
    }

    /// `like`, `ilike`
    pub fn is_pattern(&self) -> bool {
        matches!(self, FilterOp::Like | FilterOp::ILike)
    }

    /// How the operator is written in query text.
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Gte => ">=",
            FilterOp::Gt => ">",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::In => "in",
            FilterOp::IsNull => "is_null",
            FilterOp::Like => "like",
            FilterOp::ILike => "ilike",
        }
    }
}

impl std::fmt::Display for FilterOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
