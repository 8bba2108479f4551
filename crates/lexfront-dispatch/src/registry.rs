//! Subscriber registry backed by the site database.

use std::sync::Arc;

use async_trait::async_trait;

use lexfront_core::error::Result;
use lexfront_lifecycle::notify::SubscriberRegistry;
use lexfront_lifecycle::store::SiteDb;

/// Adapts `SiteDb`'s subscriber table to the registry contract the
/// lifecycle engine snapshots from at send time.
pub struct DbSubscriberRegistry {
    db: Arc<SiteDb>,
}

impl DbSubscriberRegistry {
    pub fn new(db: Arc<SiteDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriberRegistry for DbSubscriberRegistry {
    async fn count_active(&self) -> Result<u32> {
        self.db.count_active_subscribers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_only_active() {
        let db = Arc::new(SiteDb::open_in_memory().unwrap());
        db.add_subscriber("a@x.vn").unwrap();
        db.add_subscriber("b@x.vn").unwrap();
        db.unsubscribe("a@x.vn").unwrap();

        let registry = DbSubscriberRegistry::new(db);
        assert_eq!(registry.count_active().await.unwrap(), 1);
    }
}
