//! # tm-services
//!
//! Application services over the `tm-core` ports: the venue search
//! orchestrator plus the write paths that feed its aggregates.

pub mod accounts;
pub mod bookmarks;
pub mod membership;
pub mod reviews;
pub mod search;
pub mod venues;

pub use accounts::AccountService;
pub use bookmarks::BookmarkService;
pub use membership::MembershipService;
pub use reviews::ReviewService;
pub use search::{SearchService, SearchSettings};
pub use venues::VenueService;
