// file: src/logging/mod.rs
// version: 2.0.0
// guid: 9f8e7d6c-5b4a-4392-8170-fedcba987654

//! Logging setup for the registrar

pub mod logger;

pub use logger::{init_json_logger, init_logger};
