// src/core/mod.rs

// Root of the `core` module: the scan orchestration engine and everything it
// is built from.

/// Request, outcome, vulnerability and aggregate result types, with the wire
/// shapes used by the callback.
pub mod models;

/// Typed errors for validation, adapters, report parsing, callbacks and config.
pub mod error;

/// Engine configuration: defaults, an optional JSON file and environment overrides.
pub mod config;

/// Per-tool report normalizers. Pure functions from raw tool output to
/// normalized vulnerability records.
pub mod normalizer;

/// Scanner adapters and the container process runner they share.
pub mod scanner;

pub mod orchestrator;

pub mod callback;
