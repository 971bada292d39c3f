//! # oiyn-common
//!
//! Shared types, configuration, error handling, and utilities used across all Oiyn crates.
//! No matchmaking rules live here, only primitives and contracts.

pub mod auth;
pub mod config;
pub mod error;
pub mod id;
pub mod models;
pub mod pagination;
pub mod validation;
