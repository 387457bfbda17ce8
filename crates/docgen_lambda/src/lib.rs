//! AWS-oriented adapters and handlers for template document generation.
//!
//! This crate owns runtime integration details (Lambda handler, event
//! envelopes, the S3 content store and the DOCX document engine) on top of
//! the pure request and resolution primitives in `docgen_core`.

pub mod adapters;
pub mod handlers;
