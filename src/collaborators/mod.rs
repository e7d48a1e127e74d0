//! Read-only/write contracts toward the three external collaborators this
//! crate depends on but does not own: the relational source table, the
//! vector store, and the object store (§1's out-of-scope list). Each is a
//! trait so C5/C6/C7 can be tested against an in-memory fake without a
//! live database, Qdrant instance, or S3 bucket.

pub mod object_store;
pub mod source_table;
pub mod vector_store;

pub use object_store::ObjectStore;
pub use source_table::{SourceRow, SourceTable};
pub use vector_store::VectorStore;
