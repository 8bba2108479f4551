//! # Lexfront Lifecycle
//!
//! The engine that moves blog posts and newsletter campaigns through their
//! time-gated states without anyone clicking a button. Two entry points buy
//! into the same transition logic: the admin-facing [`Lifecycle`] service
//! (publish now, send now, schedule, cancel) and the background [`Sweeper`]
//! that fires once a minute and drives whatever became due.
//!
//! ## Architecture
//! ```text
//! Admin API ──┐                         ┌── SearchIndexNotifier (ping on publish)
//!             ├─→ Lifecycle ─→ SiteDb   ├── SubscriberRegistry  (snapshot at send)
//! Sweeper  ───┘    (claims)   (SQLite)  └── CampaignDispatcher  (SMTP / stub)
//! ```
//!
//! Every transition is a conditional UPDATE against the current row state,
//! so a race between an admin action and a sweep tick collapses to
//! whichever claim commits first — the loser sees `InvalidState` (or, for
//! post publishing, an idempotent no-op).

pub mod api;
pub mod campaign;
pub mod content;
pub mod notify;
pub mod store;
pub mod sweeper;

pub use api::Lifecycle;
pub use campaign::{Campaign, CampaignState};
pub use content::{Post, PostState};
pub use notify::{CampaignDispatcher, SearchIndexNotifier, SubscriberRegistry};
pub use store::SiteDb;
pub use sweeper::{SweepStats, Sweeper, SweeperHandle};
