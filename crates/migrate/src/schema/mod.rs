//! Schema inspection: live probes used as preconditions, and the diagnostic dump

pub mod dump;
pub mod probe;

pub use dump::SchemaDump;
pub use probe::{ColumnInfo, SchemaProbe};
