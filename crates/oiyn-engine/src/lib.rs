//! # oiyn-engine
//!
//! Matchmaking rules for Oiyn, independent of transport:
//! - [`MatchmakingEngine`]: create, join, edit, and moderate postings
//! - [`ChatMaterializer`] / [`ChatRooms`]: the chat opened when a posting fills
//! - [`Sweeper`]: periodic expiry of postings past their scheduled time
//!
//! Every component works against [`oiyn_db::Database`], so the same rules run
//! on PostgreSQL and on the in-memory store.

pub mod chat;
pub mod matchmaking;
pub mod sweeper;

#[cfg(test)]
mod testing;

pub use chat::{ChatMaterializer, ChatRooms};
pub use matchmaking::{JoinOutcome, MatchmakingEngine};
pub use sweeper::{SweepReport, Sweeper};
