//! smartfile: a user-scoped file management API with a TTL-bounded,
//! identity-partitioned read-through response cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
