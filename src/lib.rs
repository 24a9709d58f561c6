//! memorybox — a content-addressable archival tool for local disk and
//! S3-compatible object stores.
//!
//! Artifacts are named by the SHA-256 digest of their bytes (`File`) and
//! carry a JSON sidecar documenting provenance and user annotations
//! (metafile). The engine is backend-agnostic (`Store`): the same
//! operations (`ops`) run unmodified against a local directory or a bucket.

pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod file;
pub mod logger;
pub mod ops;
pub mod store;
