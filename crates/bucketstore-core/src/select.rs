//! Minimal document selection language.
//!
//! Stands in for a full selection-language parser so the store can be used
//! and tested on its own. Supported expressions:
//!
//! - `true`, `false`
//! - `<doctype>`: documents of that type
//! - `id == "<document id>"`, `id != "<document id>"`
//! - `<doctype>.<field> <op> <literal>` with `==`, `!=`, `<`, `<=`, `>`, `>=`
//!   and a JSON literal (string, number, `true`, `false`, `null`)
//! - `not <expr>`, `<expr> and <expr>`, `<expr> or <expr>`, parentheses
//!
//! `and` binds tighter than `or`. Parentheses and `not` nest at most
//! [`MAX_NESTING`] deep. Field comparisons evaluate to `Invalid`
//! against a bare id (a tombstone has no fields to inspect).

use crate::error::{Result, StoreError};
use crate::traits::{DocumentSelection, SelectionParser, SelectionResult};
use crate::types::{Document, DocumentId};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Parsed selection expression
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionNode {
    Constant(bool),
    DocType(String),
    IdCompare {
        op: CompareOp,
        id: String,
    },
    Field {
        doc_type: String,
        field: String,
        op: CompareOp,
        value: Value,
    },
    Not(Box<SelectionNode>),
    And(Box<SelectionNode>, Box<SelectionNode>),
    Or(Box<SelectionNode>, Box<SelectionNode>),
}

fn compare_values(op: CompareOp, actual: &Value, expected: &Value) -> SelectionResult {
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
            Some(if a == b { Ordering::Equal } else { Ordering::Less })
        }
        _ => None,
    };
    match ordering {
        Some(ordering) => op.holds(ordering).into(),
        None => SelectionResult::Invalid,
    }
}

impl DocumentSelection for SelectionNode {
    fn contains_document(&self, doc: &Document) -> SelectionResult {
        match self {
            SelectionNode::Field {
                doc_type,
                field,
                op,
                value,
            } => {
                if doc.doc_type() != doc_type {
                    return SelectionResult::False;
                }
                let actual = doc.field(field).unwrap_or(&Value::Null);
                compare_values(*op, actual, value)
            }
            SelectionNode::Not(inner) => !inner.contains_document(doc),
            SelectionNode::And(a, b) => a.contains_document(doc).and(b.contains_document(doc)),
            SelectionNode::Or(a, b) => a.contains_document(doc).or(b.contains_document(doc)),
            other => other.contains_id(doc.id()),
        }
    }

    fn contains_id(&self, id: &DocumentId) -> SelectionResult {
        match self {
            SelectionNode::Constant(value) => (*value).into(),
            SelectionNode::DocType(doc_type) => (id.doc_type() == doc_type).into(),
            SelectionNode::IdCompare { op, id: expected } => {
                compare_values(*op, &Value::String(id.to_string()), &Value::String(expected.clone()))
            }
            SelectionNode::Field { doc_type, .. } => {
                if id.doc_type() != doc_type {
                    SelectionResult::False
                } else {
                    SelectionResult::Invalid
                }
            }
            SelectionNode::Not(inner) => !inner.contains_id(id),
            SelectionNode::And(a, b) => a.contains_id(id).and(b.contains_id(id)),
            SelectionNode::Or(a, b) => a.contains_id(id).or(b.contains_id(id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Op(CompareOp),
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => s.push(escaped),
                            None => return Err(format!("unterminated escape at {pos}")),
                        },
                        Some((_, ch)) => s.push(ch),
                        None => return Err(format!("unterminated string starting at {pos}")),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let eq = chars.next_if(|&(_, next)| next == '=').is_some();
                let op = match (c, eq) {
                    ('=', true) => CompareOp::Eq,
                    ('!', true) => CompareOp::Ne,
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    ('>', true) => CompareOp::Ge,
                    _ => return Err(format!("unexpected {c:?} at {pos}")),
                };
                tokens.push(Token::Op(op));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut s = String::new();
                while let Some((_, ch)) = chars.next_if(|&(_, ch)| {
                    ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E')
                }) {
                    s.push(ch);
                }
                tokens.push(Token::Number(s));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut s = String::new();
                while let Some((_, ch)) =
                    chars.next_if(|&(_, ch)| ch.is_alphanumeric() || matches!(ch, '_' | '.'))
                {
                    s.push(ch);
                }
                tokens.push(Token::Ident(s));
            }
            other => return Err(format!("unexpected {other:?} at {pos}")),
        }
    }

    Ok(tokens)
}

/// Deepest run of parentheses and `not` the parser accepts.
pub const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(word)) if word == keyword => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn descend(&mut self) -> std::result::Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(format!("nesting deeper than {MAX_NESTING}"));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> std::result::Result<SelectionNode, String> {
        let mut node = self.parse_and()?;
        while self.eat_keyword("or") {
            node = SelectionNode::Or(Box::new(node), Box::new(self.parse_and()?));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> std::result::Result<SelectionNode, String> {
        let mut node = self.parse_unary()?;
        while self.eat_keyword("and") {
            node = SelectionNode::And(Box::new(node), Box::new(self.parse_unary()?));
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> std::result::Result<SelectionNode, String> {
        if self.eat_keyword("not") {
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(SelectionNode::Not(Box::new(inner)));
        }
        match self.next() {
            Some(Token::LParen) => {
                self.descend()?;
                let node = self.parse_or()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(node),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(Token::Ident(word)) => self.parse_atom(word),
            Some(token) => Err(format!("unexpected token {token:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_atom(&mut self, word: String) -> std::result::Result<SelectionNode, String> {
        match word.as_str() {
            "true" => return Ok(SelectionNode::Constant(true)),
            "false" => return Ok(SelectionNode::Constant(false)),
            "and" | "or" | "not" => return Err(format!("unexpected keyword {word:?}")),
            _ => {}
        }

        let Some(&Token::Op(op)) = self.peek() else {
            if word.contains('.') {
                return Err(format!("field {word:?} needs a comparison"));
            }
            return Ok(SelectionNode::DocType(word));
        };
        self.pos += 1;

        if word == "id" {
            return match (op, self.next()) {
                (CompareOp::Eq | CompareOp::Ne, Some(Token::Str(id))) => {
                    Ok(SelectionNode::IdCompare { op, id })
                }
                _ => Err("id supports only == and != against a string".to_string()),
            };
        }

        let Some((doc_type, field)) = word.split_once('.') else {
            return Err(format!("expected <doctype>.<field>, got {word:?}"));
        };
        if doc_type.is_empty() || field.is_empty() {
            return Err(format!("expected <doctype>.<field>, got {word:?}"));
        }

        let value = match self.next() {
            Some(Token::Str(s)) => Value::String(s),
            Some(Token::Number(n)) => {
                serde_json::from_str(&n).map_err(|_| format!("invalid number {n:?}"))?
            }
            Some(Token::Ident(literal)) => match literal.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => return Err(format!("expected a literal, got {literal:?}")),
            },
            other => return Err(format!("expected a literal, got {other:?}")),
        };

        Ok(SelectionNode::Field {
            doc_type: doc_type.to_string(),
            field: field.to_string(),
            op,
            value,
        })
    }
}

/// Parses the expression language described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleSelectionParser;

impl SimpleSelectionParser {
    pub fn parse_node(&self, expr: &str) -> Result<SelectionNode> {
        let invalid = |reason: String| StoreError::InvalidSelection(format!("{expr:?}: {reason}"));

        let tokens = tokenize(expr).map_err(invalid)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let node = parser.parse_or().map_err(invalid)?;
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("trailing input at {token:?}")));
        }
        Ok(node)
    }
}

impl SelectionParser for SimpleSelectionParser {
    fn parse(&self, expr: &str) -> Result<Arc<dyn DocumentSelection>> {
        Ok(Arc::new(self.parse_node(expr)?))
    }
}
