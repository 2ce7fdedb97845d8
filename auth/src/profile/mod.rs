//! # Profiles
//!
//! Social-indexer profiles keyed by wallet address, cached locally, and the
//! pre-filled draft offered to identity users who have none yet.

pub mod cache;
pub mod draft;
pub mod index;

pub use cache::ProfileFetcher;
pub use draft::{suggest_username, ProfileDraft};
pub use index::{HttpProfileIndex, MySocialProfile, ProfileIndex};
