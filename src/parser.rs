//! Query parser.
//!
//! A single deterministic pass over the lexer's tokens, one token of
//! lookahead, producing a `SyntaxTree`.
//!
//! # Syntax Overview
//!
//! ```text
//! q=(id, created_at, todo(id, !comment)).filter(todo.id=2).limit(10).order(id, desc)
//! ┬  ──────┬───────  ────────┬─────────  ────────┬─────────────────────┬────────────
//! │        │                 │                   │                     │
//! │        │                 │                   │                     └── Paging and sorting
//! │        │                 │                   └── Filter (may reach into relations)
//! │        │                 └── Relation with its own field list
//! │        └── Fields of the root entity
//! └── The only query parameter
//! ```

use crate::ast::{ActionTree, FilterOp, SortOrder, Value};
use crate::builder;
use crate::error::{TreeqlError, TreeqlResult};
use crate::lexer::{self, Spanned, Symbol, Token};
use crate::syntax::{FieldNode, Modifier, SyntaxTree};

/// Relations nested deeper than this are rejected instead of recursing further.
pub const MAX_DEPTH: usize = 64;

/// Parse query text into an action tree.
pub fn parse(input: &str) -> TreeqlResult<ActionTree> {
    builder::build(parse_syntax(input)?)
}

/// Parse query text into the generic syntax tree.
pub fn parse_syntax(input: &str) -> TreeqlResult<SyntaxTree> {
    let tokens = lexer::tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        input_len: input.len(),
    };
    parser.parse_query()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    input_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input_len, |t| t.start)
    }

    fn error(&self, expected: &str) -> TreeqlError {
        let found = match self.peek() {
            Some(token) => token.to_string(),
            None => "end of input".to_string(),
        };
        TreeqlError::syntax(
            self.position(),
            format!("expected {}, found {}", expected, found),
        )
    }

    fn at_symbol(&self, symbol: Symbol) -> bool {
        matches!(self.peek(), Some(Token::Symbol(s)) if *s == symbol)
    }

    fn expect_symbol(&mut self, symbol: Symbol) -> TreeqlResult<()> {
        if self.at_symbol(symbol) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("'{}'", symbol.as_char())))
        }
    }

    fn expect_ident(&mut self, what: &str) -> TreeqlResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(what)),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> TreeqlResult<()> {
        match self.peek() {
            Some(Token::Ident(name)) if name == keyword => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(&format!("'{}'", keyword))),
        }
    }

    /// `"q" "=" action_tree EOF`
    fn parse_query(&mut self) -> TreeqlResult<SyntaxTree> {
        self.expect_keyword("q")?;
        match self.peek() {
            Some(Token::Op("=")) => self.pos += 1,
            _ => return Err(self.error("'='")),
        }
        let tree = self.parse_action_tree(0)?;
        if self.peek().is_some() {
            return Err(self.error("end of input"));
        }
        Ok(tree)
    }

    /// `"(" field ("," field)* ")" modifier*`
    fn parse_action_tree(&mut self, depth: usize) -> TreeqlResult<SyntaxTree> {
        if depth > MAX_DEPTH {
            return Err(TreeqlError::syntax(
                self.position(),
                format!("relations nested deeper than {} levels", MAX_DEPTH),
            ));
        }

        self.expect_symbol(Symbol::LParen)?;
        let mut fields = vec![self.parse_field(depth)?];
        while self.at_symbol(Symbol::Comma) {
            self.pos += 1;
            fields.push(self.parse_field(depth)?);
        }
        self.expect_symbol(Symbol::RParen)?;

        let mut modifiers = Vec::new();
        while self.at_symbol(Symbol::Dot) {
            self.pos += 1;
            modifiers.push(self.parse_modifier()?);
        }

        Ok(SyntaxTree { fields, modifiers })
    }

    /// `"!" IDENT | IDENT | "*" | IDENT action_tree`
    fn parse_field(&mut self, depth: usize) -> TreeqlResult<FieldNode> {
        match self.peek() {
            Some(Token::Symbol(Symbol::Star)) => {
                self.pos += 1;
                Ok(FieldNode::Star)
            }
            Some(Token::Symbol(Symbol::Bang)) => {
                self.pos += 1;
                Ok(FieldNode::Bang(self.expect_ident("field name after '!'")?))
            }
            Some(Token::Ident(_)) => {
                let name = self.expect_ident("field name")?;
                if matches!(self.peek(), Some(Token::Symbol(Symbol::LParen))) {
                    let tree = self.parse_action_tree(depth + 1)?;
                    Ok(FieldNode::Relation { name, tree })
                } else {
                    Ok(FieldNode::Name(name))
                }
            }
            _ => Err(self.error("field name, '*', '!' or relation")),
        }
    }

    /// `filter(...)`, `order(...)`, `limit(...)` or `offset(...)`
    fn parse_modifier(&mut self) -> TreeqlResult<Modifier> {
        let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Err(self.error("'filter', 'order', 'limit' or 'offset'")),
        };
        let modifier = match name.as_str() {
            "filter" => {
                self.pos += 1;
                self.parse_filter()?
            }
            "order" => {
                self.pos += 1;
                self.parse_order()?
            }
            "limit" => {
                self.pos += 1;
                Modifier::Limit(self.parse_count("limit")?)
            }
            "offset" => {
                self.pos += 1;
                Modifier::Offset(self.parse_count("offset")?)
            }
            _ => return Err(self.error("'filter', 'order', 'limit' or 'offset'")),
        };
        Ok(modifier)
    }

    /// `"(" IDENT ("." IDENT)* OP rvalue ")"`
    fn parse_filter(&mut self) -> TreeqlResult<Modifier> {
        self.expect_symbol(Symbol::LParen)?;
        let mut path = vec![self.expect_ident("field to filter on")?];
        while self.at_symbol(Symbol::Dot) {
            self.pos += 1;
            if path.len() > MAX_DEPTH {
                return Err(TreeqlError::syntax(
                    self.position(),
                    format!("filter path longer than {} segments", MAX_DEPTH),
                ));
            }
            path.push(self.expect_ident("field name after '.'")?);
        }
        let op = self.parse_operator()?;
        let value = self.parse_rvalue(true)?;
        self.expect_symbol(Symbol::RParen)?;
        Ok(Modifier::Filter { path, op, value })
    }

    fn parse_operator(&mut self) -> TreeqlResult<FilterOp> {
        let op = match self.peek() {
            Some(Token::Op(sym)) => FilterOp::from_symbol(sym),
            Some(Token::Ident(kw)) => FilterOp::from_keyword(kw),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                Ok(op)
            }
            None => Err(self.error(
                "filter operator (=, !=, >, >=, <, <=, in, is_null, like, ilike)",
            )),
        }
    }

    /// `DATE | NUMBER | QUOTED_STRING`, or a bracketed list of those.
    fn parse_rvalue(&mut self, allow_list: bool) -> TreeqlResult<Value> {
        let value = match self.peek() {
            Some(Token::Int(n)) => Value::Int(*n),
            Some(Token::Float(n)) => Value::Float(*n),
            Some(Token::Date(d)) => Value::Date(*d),
            Some(Token::Str(s)) => Value::String(s.clone()),
            Some(Token::Symbol(Symbol::LBracket)) if allow_list => {
                self.pos += 1;
                let mut items = vec![self.parse_rvalue(false)?];
                while self.at_symbol(Symbol::Comma) {
                    self.pos += 1;
                    items.push(self.parse_rvalue(false)?);
                }
                self.expect_symbol(Symbol::RBracket)?;
                return Ok(Value::List(items));
            }
            _ if allow_list => return Err(self.error("date, number, quoted string or list")),
            _ => return Err(self.error("date, number or quoted string")),
        };
        self.pos += 1;
        Ok(value)
    }

    /// `"(" IDENT "," ("asc"|"desc") ")"`
    fn parse_order(&mut self) -> TreeqlResult<Modifier> {
        self.expect_symbol(Symbol::LParen)?;
        let field = self.expect_ident("field to order by")?;
        self.expect_symbol(Symbol::Comma)?;
        let order = match self.peek() {
            Some(Token::Ident(kw)) => SortOrder::from_keyword(kw),
            _ => None,
        };
        let Some(order) = order else {
            return Err(self.error("'asc' or 'desc'"));
        };
        self.pos += 1;
        self.expect_symbol(Symbol::RParen)?;
        Ok(Modifier::Order { field, order })
    }

    /// `"(" INTEGER ")"`, non-negative.
    fn parse_count(&mut self, what: &str) -> TreeqlResult<u64> {
        self.expect_symbol(Symbol::LParen)?;
        let count = match self.peek() {
            Some(Token::Int(n)) if *n >= 0 => *n as u64,
            _ => return Err(self.error(&format!("non-negative integer for {}", what))),
        };
        self.pos += 1;
        self.expect_symbol(Symbol::RParen)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn name(s: &str) -> FieldNode {
        FieldNode::Name(s.to_string())
    }

    #[test]
    fn test_flat_fields() {
        let tree = parse_syntax("q=(id, *, !comment)").unwrap();
        assert_eq!(
            tree.fields,
            vec![name("id"), FieldNode::Star, FieldNode::Bang("comment".into())]
        );
        assert!(tree.modifiers.is_empty());
    }

    #[test]
    fn test_relation_with_filter() {
        let tree = parse_syntax("q=(id,created_at,todo(id)).filter(todo.id=2)").unwrap();
        assert_eq!(tree.fields.len(), 3);
        match &tree.fields[2] {
            FieldNode::Relation { name, tree } => {
                assert_eq!(name, "todo");
                assert_eq!(tree.fields, vec![FieldNode::Name("id".into())]);
            }
            other => panic!("expected relation, got {other:?}"),
        }
        assert_eq!(
            tree.modifiers,
            vec![Modifier::Filter {
                path: vec!["todo".into(), "id".into()],
                op: FilterOp::Eq,
                value: Value::Int(2),
            }]
        );
    }

    #[test]
    fn test_all_modifiers() {
        let tree = parse_syntax(
            r#"q=(id).filter(comment ilike "%milk%").offset(5).limit(10).order(id, desc)"#,
        )
        .unwrap();
        assert_eq!(
            tree.modifiers,
            vec![
                Modifier::Filter {
                    path: vec!["comment".into()],
                    op: FilterOp::ILike,
                    value: Value::String("%milk%".into()),
                },
                Modifier::Offset(5),
                Modifier::Limit(10),
                Modifier::Order {
                    field: "id".into(),
                    order: SortOrder::Desc,
                },
            ]
        );
    }

    #[test]
    fn test_whitespace_is_insignificant() {
        let a = parse_syntax("q=(id,todo(id)).filter(todo.id>=2)").unwrap();
        let b = parse_syntax(" q = ( id , todo ( id ) ) . filter ( todo . id >= 2 ) ").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_keyword_operators_and_lists() {
        let tree = parse_syntax("q=(id).filter(priority in [1, 2, 3])").unwrap();
        assert_eq!(
            tree.modifiers,
            vec![Modifier::Filter {
                path: vec!["priority".into()],
                op: FilterOp::In,
                value: Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            }]
        );
    }

    #[test]
    fn test_deep_nesting() {
        let tree = parse_syntax("q=(id, slaves(id, slavedetails(info)))").unwrap();
        let FieldNode::Relation { tree: slaves, .. } = &tree.fields[1] else {
            panic!("expected relation");
        };
        assert!(matches!(
            &slaves.fields[1],
            FieldNode::Relation { name, .. } if name == "slavedetails"
        ));
    }

    #[test]
    fn test_missing_prefix() {
        let err = parse_syntax("(id)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Syntax error at position 0: expected 'q', found '('"
        );
    }

    #[test]
    fn test_unclosed_field_list() {
        let err = parse_syntax("q=(id, comment").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Syntax error at position 14: expected ')', found end of input"
        );
    }

    #[test]
    fn test_empty_field_list() {
        let err = parse_syntax("q=()").unwrap_err();
        assert!(err.to_string().contains("position 3"));
    }

    #[test]
    fn test_unknown_modifier() {
        let err = parse_syntax("q=(id).group(id)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Syntax error at position 7: expected 'filter', 'order', 'limit' or 'offset', found 'group'"
        );
    }

    #[test]
    fn test_bad_operator() {
        let err = parse_syntax("q=(id).filter(id between 2)").unwrap_err();
        assert!(err.to_string().contains("filter operator"));
    }

    #[test]
    fn test_bad_sort_order() {
        let err = parse_syntax("q=(id).order(id, up)").unwrap_err();
        assert!(err.to_string().contains("'asc' or 'desc'"));
    }

    #[test]
    fn test_negative_limit() {
        let err = parse_syntax("q=(id).limit(-1)").unwrap_err();
        assert!(err.to_string().contains("non-negative integer for limit"));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse_syntax("q=(id) extra").unwrap_err();
        assert!(err.to_string().contains("expected end of input"));
    }

    #[test]
    fn test_nesting_limit() {
        let mut query = String::from("q=(id");
        for _ in 0..=MAX_DEPTH {
            query.push_str(", r(id");
        }
        for _ in 0..=MAX_DEPTH {
            query.push(')');
        }
        query.push(')');
        let err = parse_syntax(&query).unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
    }
}
