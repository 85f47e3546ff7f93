// file: src/lib.rs
// version: 3.0.0
// guid: d82472d1-7f0f-4eb4-b0a3-6e1547103eb4

//! # Node Registrar
//!
//! Identifies cluster machines by a stable fingerprint of their hardware,
//! provisions each new machine with a certificate, disk-encryption key and
//! storage OSDs, and keeps that state in etcd across reboots and hardware
//! changes.

pub mod api;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod hardware;
pub mod identity;
pub mod lifecycle;
pub mod logging;
pub mod shadow;
pub mod storage;
pub mod store;

pub use error::{ErrorKind, RegistrarError, Result};

/// Version information for the registrar
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
