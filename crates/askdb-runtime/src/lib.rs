//! # askdb-runtime
//!
//! The workflow controller: finite-state orchestration that drives the
//! language engine through bounded capability loops until the context
//! is judged sufficient, then emits the final answer.
//!
//! One session is one question. The controller runs two cooperating
//! sub-loops over the same step functions:
//!
//! 1. **Data retrieval** — generate a query plan, execute capabilities,
//!    consolidate results, evaluate sufficiency, retry on failure.
//! 2. **Post-processing** — optional analysis scripts over the fetched
//!    data, with its own retry streak.
//!
//! Both loops are bounded: a consecutive-failure budget (`max_retries`)
//! and a pass ceiling (`max_passes`). Exhaustion never aborts the run;
//! it degrades to the final answer step.

#![deny(unsafe_code)]

pub mod answer;
pub mod consolidate;
pub mod controller;
pub mod errors;
pub mod execution;
pub mod gate;
pub mod generation;
pub mod prompts;
pub mod state;

pub use controller::{Controller, ControllerConfig, RunReport};
pub use errors::{ControllerError, Result};
pub use state::SessionState;
