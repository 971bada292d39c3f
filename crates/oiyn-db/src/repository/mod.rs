//! Repository layer: one trait per aggregate, organized by domain.
//!
//! Each module holds the trait and its PostgreSQL implementation; the
//! in-memory implementation lives in [`crate::memory`].

pub mod conversations;
pub mod postings;
pub mod users;
pub mod venues;

pub use conversations::{ConversationRepository, PgConversations};
pub use postings::{PgPostings, PostingFilter, PostingRepository, SortOrder};
pub use users::{PgUsers, UserRepository};
pub use venues::{PgVenues, VenueRepository};
