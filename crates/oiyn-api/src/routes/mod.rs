//! API route modules.

pub mod admin;
pub mod auth;
pub mod chats;
pub mod health;
pub mod postings;
pub mod users;
pub mod venues;
