//! Collaborator contracts invoked around lifecycle transitions.
//!
//! The engine only ever calls these after (or, for the registry, just
//! before) a committed state change. Concrete implementations live in
//! `lexfront-dispatch`; tests plug in fakes.

use async_trait::async_trait;
use lexfront_core::error::Result;

use crate::campaign::Campaign;

/// Read-only view of the newsletter subscriber list. The count taken here
/// becomes the campaign's frozen recipient snapshot.
#[async_trait]
pub trait SubscriberRegistry: Send + Sync {
    async fn count_active(&self) -> Result<u32>;
}

/// Hands a campaign's rendered content and its recipient snapshot to the
/// outbound email machinery. An `Err` here means the send attempt failed;
/// the caller decides whether to retry.
#[async_trait]
pub trait CampaignDispatcher: Send + Sync {
    async fn send(&self, campaign: &Campaign, recipients: u32) -> Result<()>;
}

/// Best-effort ping to the search engine after a post goes live. Callers
/// log and swallow failures — indexing lag never blocks publication.
#[async_trait]
pub trait SearchIndexNotifier: Send + Sync {
    async fn notify(&self, url: &str) -> Result<()>;
}
