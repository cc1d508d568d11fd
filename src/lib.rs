//! Ratekeeper - In-process Fixed-Window Rate Limiting
//!
//! This crate caps how often a caller, identified by a key, may perform an
//! action within a fixed time window. Named policies cover distinct endpoint
//! classes, and a background task reclaims records for keys that went quiet.
//! State lives in a single process; nothing is shared across instances.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
