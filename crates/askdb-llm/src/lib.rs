//! # askdb-llm
//!
//! Language engine abstraction and the Gemini REST client.
//!
//! The [`engine::Engine`] trait is the single seam between the workflow
//! controller and any concrete model backend. [`gemini::GeminiEngine`]
//! implements it against the `generateContent` REST API;
//! [`recording::RecordingEngine`] wraps any engine and writes each
//! call to disk for offline inspection.

#![deny(unsafe_code)]

pub mod engine;
pub mod gemini;
pub mod recording;

pub use engine::{
    Completion, CompletionRequest, Engine, EngineError, EngineResult, SamplingOptions,
};
pub use gemini::{GeminiConfig, GeminiEngine};
pub use recording::RecordingEngine;
