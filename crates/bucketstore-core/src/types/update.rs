use crate::error::{Result, StoreError};
use crate::types::document::{Document, DocumentId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field mutation inside a [`DocumentUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldUpdate {
    /// Set the field to the given value.
    Assign { field: String, value: Value },
    /// Remove the field.
    Clear { field: String },
    /// Add to an integer field; a missing field counts as zero.
    Increment { field: String, delta: i64 },
}

/// Partial mutation of a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    id: DocumentId,
    #[serde(default)]
    create_if_non_existent: bool,
    #[serde(default)]
    operations: Vec<FieldUpdate>,
}

impl DocumentUpdate {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            create_if_non_existent: false,
            operations: Vec::new(),
        }
    }

    /// Synthesize an empty document when none exists instead of skipping.
    pub fn create_if_non_existent(mut self, create: bool) -> Self {
        self.create_if_non_existent = create;
        self
    }

    pub fn assign(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.operations.push(FieldUpdate::Assign {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn clear(mut self, field: impl Into<String>) -> Self {
        self.operations.push(FieldUpdate::Clear {
            field: field.into(),
        });
        self
    }

    pub fn increment(mut self, field: impl Into<String>, delta: i64) -> Self {
        self.operations.push(FieldUpdate::Increment {
            field: field.into(),
            delta,
        });
        self
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn creates_if_non_existent(&self) -> bool {
        self.create_if_non_existent
    }

    pub fn operations(&self) -> &[FieldUpdate] {
        &self.operations
    }

    /// Apply every operation to `doc` in order.
    ///
    /// The document is left untouched if any operation fails.
    pub fn apply_to(&self, doc: &mut Document) -> Result<()> {
        if doc.id() != &self.id {
            return Err(StoreError::InvalidUpdate(format!(
                "update for {} applied to document {}",
                self.id,
                doc.id()
            )));
        }

        let mut updated = doc.clone();
        for op in &self.operations {
            match op {
                FieldUpdate::Assign { field, value } => updated.set_field(field.clone(), value.clone()),
                FieldUpdate::Clear { field } => {
                    updated.remove_field(field);
                }
                FieldUpdate::Increment { field, delta } => {
                    let current = match updated.field(field) {
                        None => 0,
                        Some(value) => value.as_i64().ok_or_else(|| {
                            StoreError::InvalidUpdate(format!(
                                "cannot increment non-integer field {field:?} of {}",
                                self.id
                            ))
                        })?,
                    };
                    let next = current.checked_add(*delta).ok_or_else(|| {
                        StoreError::InvalidUpdate(format!("increment of {field:?} overflows"))
                    })?;
                    updated.set_field(field.clone(), next);
                }
            }
        }

        *doc = updated;
        Ok(())
    }
}
