use crate::error::Result;
use crate::types::{Document, DocumentId};
use std::sync::Arc;

/// Three-valued outcome of evaluating a selection.
///
/// `Invalid` means the predicate could not be decided for the input, for
/// example a field comparison evaluated against a bare document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionResult {
    True,
    False,
    Invalid,
}

impl SelectionResult {
    pub fn is_true(self) -> bool {
        self == SelectionResult::True
    }

    pub fn and(self, other: SelectionResult) -> SelectionResult {
        use SelectionResult::*;
        match (self, other) {
            (False, _) | (_, False) => False,
            (True, True) => True,
            _ => Invalid,
        }
    }

    pub fn or(self, other: SelectionResult) -> SelectionResult {
        use SelectionResult::*;
        match (self, other) {
            (True, _) | (_, True) => True,
            (False, False) => False,
            _ => Invalid,
        }
    }

}

impl std::ops::Not for SelectionResult {
    type Output = SelectionResult;

    fn not(self) -> SelectionResult {
        match self {
            SelectionResult::True => SelectionResult::False,
            SelectionResult::False => SelectionResult::True,
            SelectionResult::Invalid => SelectionResult::Invalid,
        }
    }
}

impl From<bool> for SelectionResult {
    fn from(value: bool) -> Self {
        if value {
            SelectionResult::True
        } else {
            SelectionResult::False
        }
    }
}

/// A parsed document selection predicate.
pub trait DocumentSelection: Send + Sync {
    /// Evaluate against a stored document version.
    fn contains_document(&self, doc: &Document) -> SelectionResult;

    /// Evaluate against an identity alone (used for tombstones).
    fn contains_id(&self, id: &DocumentId) -> SelectionResult;
}

/// Turns selection strings into evaluable predicates.
pub trait SelectionParser: Send + Sync {
    /// Parse `expr`, failing with `StoreError::InvalidSelection` when it is
    /// malformed.
    fn parse(&self, expr: &str) -> Result<Arc<dyn DocumentSelection>>;
}
