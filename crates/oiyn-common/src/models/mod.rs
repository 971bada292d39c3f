//! Core domain models shared across all Oiyn services.
//!
//! These are the "truth" types: what the store persists and the API serializes.
//! Postings and conversations embed [`ProfileSnapshot`] values rather than
//! referencing users, so rendering them needs no extra lookups.

pub mod conversation;
pub mod posting;
pub mod user;
pub mod venue;

/// Re-export all model types for convenience.
pub use conversation::*;
pub use posting::*;
pub use user::*;
pub use venue::*;
