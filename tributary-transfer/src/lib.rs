//! Document store to object store transfer
//!
//! [`DocumentTransferOperator`] runs a find or aggregate query against a
//! [`DocumentStore`], optionally transforms the documents, serialises them
//! one JSON document per line and writes the result to an [`ObjectStore`].
//! Both stores are collaborator traits; in-memory implementations are
//! provided for tests and local runs.

pub mod error;
pub mod operator;
pub mod store;

pub use error::{TransferError, TransferResult};
pub use operator::{stringify, DocumentTransferConfig, DocumentTransferOperator, Transform, TransferReport};
pub use store::{
    Compression, DocumentQuery, DocumentSource, DocumentStore, InMemoryDocumentStore,
    InMemoryObjectStore, ObjectStore, StoredObject,
};
