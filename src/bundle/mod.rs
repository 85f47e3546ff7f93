// file: src/bundle/mod.rs
// version: 1.0.0
// guid: 3f8e1a6d-2c57-4b09-a4d1-6e9b0c7f5a13

//! Credential archives
//!
//! An archive is described by a manifest: a fixed list of paths, modes and
//! the function producing each file from a context value. Building it
//! renders every file in order into a gzip-compressed tar.

pub mod client;
pub mod worker;

pub use client::{client_archive, ClientContext, CLIENT_ARCHIVE_NAME};
pub use worker::{worker_archive, WorkerContext, WORKER_ARCHIVE_NAME};

use crate::{RegistrarError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;

/// One file of an archive
pub struct ManifestFile<C> {
    pub path: &'static str,
    pub mode: u32,
    pub contents: fn(&C) -> Result<Vec<u8>>,
}

/// Render a manifest against `ctx` into a `.tar.gz`
pub fn build_archive<C>(manifest: &[ManifestFile<C>], ctx: &C) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;

    for file in manifest {
        let data = (file.contents)(ctx)?;

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(file.mode);
        header.set_mtime(mtime);
        builder
            .append_data(&mut header, file.path, data.as_slice())
            .map_err(|e| RegistrarError::archive(format!("cannot write {}: {}", file.path, e)))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| RegistrarError::archive(format!("cannot close archive: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| RegistrarError::archive(format!("cannot close gzip stream: {}", e)))
}
