use crate::types::{Document, FieldSet};

/// Strips documents down to a requested [`FieldSet`].
pub trait FieldProjector: Send + Sync {
    fn project(&self, doc: &Document, fields: &FieldSet) -> Document;
}

/// Keeps the id and the fields named by the field set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFieldProjector;

impl FieldProjector for DefaultFieldProjector {
    fn project(&self, doc: &Document, fields: &FieldSet) -> Document {
        match fields {
            FieldSet::All => doc.clone(),
            FieldSet::DocIdOnly | FieldSet::None => Document::new(doc.id().clone()),
            FieldSet::Fields(names) => {
                let mut projected = doc.clone();
                projected.retain_fields(|name| names.contains(name));
                projected
            }
        }
    }
}
