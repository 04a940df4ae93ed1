//! # askdb-core
//!
//! Foundation types for the askdb agent.
//!
//! This crate provides the shared vocabulary that all other askdb crates
//! depend on:
//!
//! - **Messages**: [`messages::Message`] enum with user, assistant, and
//!   capability-result variants forming the append-only transcript
//! - **Capability requests**: [`messages::CapabilityRequest`] emitted by the
//!   reasoning engine
//! - **Descriptors**: [`descriptor::CapabilityDescriptor`], the schema
//!   advertised to the engine for each capability
//! - **Outcomes**: [`outcome::CapabilityOutcome`], the typed success/failure
//!   sum the retry machinery branches on, plus payload and failure-kind types
//! - **Text**: char-safe clipping and code-fence stripping helpers
//! - **Constants**: sentinels, failure markers, preview sizing
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other askdb crates.

#![deny(unsafe_code)]

pub mod constants;
pub mod descriptor;
pub mod messages;
pub mod outcome;
pub mod text;
