pub mod bucket_id;
pub mod completion;
pub mod projection;
pub mod provider;
pub mod selection;

pub use bucket_id::{BucketIdFactory, DefaultBucketIdFactory};
pub use completion::OperationComplete;
pub use projection::{DefaultFieldProjector, FieldProjector};
pub use provider::{Completion, PersistenceProvider};
pub use selection::{DocumentSelection, SelectionParser, SelectionResult};
