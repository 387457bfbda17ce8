//! Shared document generation domain primitives.
//!
//! This crate owns the request contract and the decision logic of the
//! template pipeline: payload decoding, parameter fallback resolution and
//! template selection. It intentionally excludes AWS SDK, Lambda runtime and
//! document format concerns.

pub mod config;
pub mod contract;
pub mod decode;
pub mod resolve;
pub mod template_match;
