//! # askdb-capabilities
//!
//! Capability trait, registry, and the four capabilities the agent can
//! invoke:
//!
//! - [`warehouse::ExecuteSql`] — validated SQL against a REST warehouse,
//!   results persisted as labeled CSV
//! - [`metadata::FetchMetadata`] — schema catalog from a YAML file, with
//!   engine summarization of oversized catalogs
//! - [`interpreter::RunPython`] — analysis scripts in a subprocess with
//!   timeout and cancellation
//! - [`similarity::SimilarQueries`] — ranked previously-answered
//!   questions from an embeddings-backed SQLite cache
//!
//! Capabilities return `Result<CapabilityPayload, CapabilityError>`;
//! the runtime's execution step maps errors to typed failure outcomes.

#![deny(unsafe_code)]

pub mod errors;
pub mod interpreter;
pub mod metadata;
pub mod registry;
pub mod similarity;
pub mod traits;
pub mod warehouse;

pub use errors::CapabilityError;
pub use interpreter::RunPython;
pub use metadata::FetchMetadata;
pub use registry::CapabilityRegistry;
pub use similarity::{
    seed_from_json, EmbeddingsClient, SimilarQueries, SimilarityStore,
};
pub use traits::{Capability, InvocationContext};
pub use warehouse::{ExecuteSql, RestWarehouse, RestWarehouseConfig, Warehouse};
