//! Integration entry point for the handler test suite. Cargo only picks up
//! files directly under `tests/`, so this root file pulls in the per-module
//! tests under `tests/handlers/`.

mod common;
mod handlers;
