//! Application services orchestrating domain logic and persistence.

pub mod auth;
pub mod error;
pub mod files;
pub mod monitoring;
pub mod pagination;
pub mod processing;
pub mod repos;
