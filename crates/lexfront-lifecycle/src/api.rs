//! The lifecycle service — the single entry point for every transition.
//!
//! Admin request handlers and the background sweeper both go through the
//! methods here, so guards and side effects cannot drift apart between the
//! two. Each method reads current state fresh from the store, performs one
//! conditional transition, then fires any post-commit side effect.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lexfront_core::config::DispatchConfig;
use lexfront_core::error::{LexfrontError, Result};

use crate::campaign::{Campaign, CampaignState};
use crate::content::{Post, PostState};
use crate::notify::{CampaignDispatcher, SearchIndexNotifier, SubscriberRegistry};
use crate::store::SiteDb;

/// Orchestrates publication and campaign transitions against the store and
/// the side-effect collaborators.
pub struct Lifecycle {
    db: Arc<SiteDb>,
    registry: Arc<dyn SubscriberRegistry>,
    dispatcher: Arc<dyn CampaignDispatcher>,
    search: Arc<dyn SearchIndexNotifier>,
    base_url: String,
    dispatch_cfg: DispatchConfig,
}

impl Lifecycle {
    pub fn new(
        db: Arc<SiteDb>,
        registry: Arc<dyn SubscriberRegistry>,
        dispatcher: Arc<dyn CampaignDispatcher>,
        search: Arc<dyn SearchIndexNotifier>,
        base_url: &str,
        dispatch_cfg: DispatchConfig,
    ) -> Self {
        Self {
            db,
            registry,
            dispatcher,
            search,
            base_url: base_url.to_string(),
            dispatch_cfg,
        }
    }

    pub fn db(&self) -> &Arc<SiteDb> {
        &self.db
    }

    // ─── Posts ──────────────────────────────────────

    /// Create a new draft post.
    pub fn create_post(&self, title: &str, slug: &str, body: &str) -> Result<Post> {
        let post = Post::new(title, slug, body);
        self.db.insert_post(&post)?;
        tracing::info!("📝 Post created: '{}' ({})", post.title, post.id);
        Ok(post)
    }

    /// Set a post's publication trigger. Past times are accepted and mean
    /// "publish on the next sweep".
    pub fn schedule_post(&self, id: &str, at: DateTime<Utc>) -> Result<Post> {
        let mut post = self.db.get_post(id)?;
        post.schedule(at)?;
        // Conditional write: a publish racing this schedule wins.
        if !self.db.set_post_trigger(id, at, Utc::now())? {
            return Err(LexfrontError::InvalidState(format!(
                "post {id} is already published"
            )));
        }
        tracing::info!("📅 Post '{}' scheduled for {}", post.title, at);
        self.db.get_post(id)
    }

    /// Clear a post's publication trigger.
    pub fn cancel_post_schedule(&self, id: &str) -> Result<Post> {
        // get_post first so an unknown id reports NotFound, not InvalidState
        let post = self.db.get_post(id)?;
        if !self.db.clear_post_trigger(id, Utc::now())? {
            return Err(LexfrontError::InvalidState(format!(
                "post {} has no scheduled publication",
                post.id
            )));
        }
        tracing::info!("🚫 Post '{}' schedule cancelled", post.title);
        self.db.get_post(id)
    }

    /// Publish a post immediately. Shared by the admin publish button and
    /// the sweep tick; idempotent on an already-published post, and the
    /// search ping fires only for the claim winner.
    pub async fn publish_post_now(&self, id: &str) -> Result<Post> {
        self.db.get_post(id)?;
        let now = Utc::now();
        if self.db.claim_post_publish(id, now)? {
            let post = self.db.get_post(id)?;
            tracing::info!("🚀 Post published: '{}' ({})", post.title, post.id);
            self.ping_search_index(&post).await;
            return Ok(post);
        }
        // Already published — return the row untouched.
        self.db.get_post(id)
    }

    /// Take a published post back to draft.
    pub fn unpublish_post(&self, id: &str) -> Result<Post> {
        let mut post = self.db.get_post(id)?;
        post.unpublish()?;
        if !self.db.revert_post_publish(id, Utc::now())? {
            return Err(LexfrontError::InvalidState(format!(
                "post {id} is not published"
            )));
        }
        tracing::info!("↩️ Post unpublished: '{}'", post.title);
        self.db.get_post(id)
    }

    /// Drafts with a pending trigger, for the admin scheduling view.
    pub fn list_scheduled_posts(&self) -> Result<Vec<Post>> {
        Ok(self
            .db
            .list_posts()?
            .into_iter()
            .filter(|p| p.state == PostState::Draft && p.publish_at.is_some())
            .collect())
    }

    /// Best-effort search-engine ping. Indexing lag never blocks or rolls
    /// back a publication.
    async fn ping_search_index(&self, post: &Post) {
        let url = post.url(&self.base_url);
        if let Err(e) = self.search.notify(&url).await {
            tracing::warn!("⚠️ Search index ping failed for {url}: {e}");
        }
    }

    // ─── Campaigns ──────────────────────────────────────

    /// Create a new draft campaign.
    pub fn create_campaign(&self, subject: &str, body_html: &str) -> Result<Campaign> {
        let campaign = Campaign::new(subject, body_html);
        self.db.insert_campaign(&campaign)?;
        tracing::info!("📨 Campaign created: '{}' ({})", campaign.subject, campaign.id);
        Ok(campaign)
    }

    /// Schedule a campaign for a strictly-future send time.
    pub fn schedule_campaign(&self, id: &str, at: DateTime<Utc>) -> Result<Campaign> {
        let mut campaign = self.db.get_campaign(id)?;
        campaign.schedule(at, Utc::now())?;
        // Conditional write: if a concurrent send claimed the row between
        // the read above and here, the schedule loses.
        if !self.db.set_campaign_trigger(id, at, Utc::now())? {
            let current = self.db.get_campaign(id)?;
            return Err(LexfrontError::InvalidState(format!(
                "campaign {} is {} and cannot be scheduled",
                current.id,
                current.state.as_str()
            )));
        }
        tracing::info!("📅 Campaign '{}' scheduled for {}", campaign.subject, at);
        self.db.get_campaign(id)
    }

    /// Cancel a scheduled send. Atomic: if a sweep tick has already claimed
    /// the campaign into `sending`, the cancel loses and reports it.
    pub fn cancel_campaign_schedule(&self, id: &str) -> Result<Campaign> {
        let campaign = self.db.get_campaign(id)?;
        if !self.db.cancel_campaign_schedule(id, Utc::now())? {
            return Err(LexfrontError::InvalidState(format!(
                "campaign {} is {}, not scheduled",
                campaign.id,
                campaign.state.as_str()
            )));
        }
        tracing::info!("🚫 Campaign '{}' schedule cancelled", campaign.subject);
        self.db.get_campaign(id)
    }

    /// Send a campaign now. Shared by the admin send button and the sweep
    /// tick:
    ///
    /// 1. re-read and reject anything not draft/scheduled;
    /// 2. snapshot the active-subscriber count and claim the row into
    ///    `sending` in one conditional update (double-send guard);
    /// 3. dispatch, retrying with exponential backoff up to the configured
    ///    attempt budget;
    /// 4. conclude `sent` or, once attempts are exhausted, terminal
    ///    `failed`.
    pub async fn send_campaign_now(&self, id: &str) -> Result<Campaign> {
        let campaign = self.db.get_campaign(id)?;
        if !campaign.state.can_send() {
            return Err(LexfrontError::InvalidState(format!(
                "campaign {} is {} and cannot be sent",
                campaign.id,
                campaign.state.as_str()
            )));
        }

        let recipients = self.registry.count_active().await?;
        let now = Utc::now();
        if !self.db.claim_campaign_send(id, recipients, now)? {
            // A concurrent trigger won the claim between our read and now.
            let current = self.db.get_campaign(id)?;
            return Err(LexfrontError::InvalidState(format!(
                "campaign {} is {} and cannot be sent",
                current.id,
                current.state.as_str()
            )));
        }

        let claimed = self.db.get_campaign(id)?;
        tracing::info!(
            "📤 Sending campaign '{}' to {} recipients",
            claimed.subject,
            recipients
        );

        match self.dispatch_with_retry(&claimed, recipients).await {
            Ok(()) => {
                self.db.finish_campaign(id, true, Utc::now())?;
                let sent = self.db.get_campaign(id)?;
                tracing::info!("✅ Campaign sent: '{}'", sent.subject);
                Ok(sent)
            }
            Err(e) => {
                // The dispatch error is the root cause; a failure to record
                // it must not replace it.
                if let Err(fin) = self.db.finish_campaign(id, false, Utc::now()) {
                    tracing::warn!(
                        "⚠️ Could not mark campaign '{}' failed: {fin}",
                        claimed.subject
                    );
                }
                tracing::error!("❌ Campaign '{}' failed: {e}", claimed.subject);
                Err(e)
            }
        }
    }

    /// Dispatch with bounded retries; attempt n waits base * 2^(n-1)
    /// before retrying, capped so large attempt budgets stay sane.
    async fn dispatch_with_retry(&self, campaign: &Campaign, recipients: u32) -> Result<()> {
        let max = self.dispatch_cfg.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=max {
            match self.dispatcher.send(campaign, recipients).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Dispatch attempt {attempt}/{max} failed for '{}': {e}",
                        campaign.subject
                    );
                    last_err = Some(e);
                    if attempt < max {
                        let backoff = backoff_secs(self.dispatch_cfg.retry_base_secs, attempt);
                        tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
                    }
                }
            }
        }
        Err(LexfrontError::Dispatch(
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown dispatch error".into()),
        ))
    }

    /// Campaigns waiting on a trigger, for the admin scheduling view.
    pub fn list_scheduled_campaigns(&self) -> Result<Vec<Campaign>> {
        Ok(self
            .db
            .list_campaigns()?
            .into_iter()
            .filter(|c| c.state == CampaignState::Scheduled)
            .collect())
    }
}

/// Retry delay in seconds for 1-based attempt `n`: base * 2^(n-1). The
/// exponent is capped so an oversized attempt budget cannot overflow the
/// shift or produce absurd sleeps.
fn backoff_secs(base: u64, attempt: u32) -> u64 {
    const MAX_EXP: u32 = 10;
    base.saturating_mul(1u64 << attempt.saturating_sub(1).min(MAX_EXP))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn service(
        subscribers: u32,
        fail_first: u32,
    ) -> (Lifecycle, Arc<FakeDispatcher>, Arc<FakeSearch>) {
        let db = Arc::new(SiteDb::open_in_memory().unwrap());
        let dispatcher = Arc::new(FakeDispatcher::new(fail_first));
        let search = Arc::new(FakeSearch::default());
        let svc = Lifecycle::new(
            db,
            Arc::new(FakeRegistry(AtomicU32::new(subscribers))),
            dispatcher.clone(),
            search.clone(),
            "https://nguyen-law.vn",
            DispatchConfig {
                max_attempts: 3,
                retry_base_secs: 0,
            },
        );
        (svc, dispatcher, search)
    }

    #[tokio::test]
    async fn test_publish_now_idempotent_and_pings_once() {
        let (svc, _, search) = service(0, 0);
        let post = svc.create_post("News", "news", "").unwrap();

        let first = svc.publish_post_now(&post.id).await.unwrap();
        assert_eq!(first.state, PostState::Published);
        let published_at = first.published_at.unwrap();

        let second = svc.publish_post_now(&post.id).await.unwrap();
        assert_eq!(second.published_at, Some(published_at));

        let pinged = search.pinged.lock().unwrap();
        assert_eq!(pinged.as_slice(), ["https://nguyen-law.vn/blog/news"]);
    }

    #[tokio::test]
    async fn test_publish_unknown_post() {
        let (svc, _, _) = service(0, 0);
        assert!(matches!(
            svc.publish_post_now("post-nope").await,
            Err(LexfrontError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_send_now_snapshots_and_sends() {
        let (svc, dispatcher, _) = service(128, 0);
        let c = svc.create_campaign("Digest", "<p>hi</p>").unwrap();

        let sent = svc.send_campaign_now(&c.id).await.unwrap();
        assert_eq!(sent.state, CampaignState::Sent);
        assert_eq!(sent.recipient_count, 128);
        assert!(sent.sent_at.is_some());
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_send_now_guards_terminal_states() {
        let (svc, dispatcher, _) = service(10, 0);
        let c = svc.create_campaign("t", "").unwrap();
        svc.send_campaign_now(&c.id).await.unwrap();

        let err = svc.send_campaign_now(&c.id).await.unwrap_err();
        assert!(matches!(err, LexfrontError::InvalidState(_)));
        // Dispatcher was not invoked again and the snapshot is untouched.
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.db().get_campaign(&c.id).unwrap().recipient_count, 10);
    }

    #[tokio::test]
    async fn test_send_retry_succeeds_within_budget() {
        let (svc, dispatcher, _) = service(5, 2);
        let c = svc.create_campaign("t", "").unwrap();

        let sent = svc.send_campaign_now(&c.id).await.unwrap();
        assert_eq!(sent.state, CampaignState::Sent);
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_send_exhausted_retries_marks_failed() {
        let (svc, dispatcher, _) = service(5, 10);
        let c = svc.create_campaign("t", "").unwrap();

        let err = svc.send_campaign_now(&c.id).await.unwrap_err();
        assert!(matches!(err, LexfrontError::Dispatch(_)));
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 3);

        let failed = svc.db().get_campaign(&c.id).unwrap();
        assert_eq!(failed.state, CampaignState::Failed);
        assert!(failed.sent_at.is_none());
        assert_eq!(failed.recipient_count, 5);
    }

    #[tokio::test]
    async fn test_snapshot_frozen_after_registry_changes() {
        let db = Arc::new(SiteDb::open_in_memory().unwrap());
        let registry = Arc::new(FakeRegistry(AtomicU32::new(50)));
        let svc = Lifecycle::new(
            db,
            registry.clone(),
            Arc::new(FakeDispatcher::new(0)),
            Arc::new(FakeSearch::default()),
            "https://x",
            DispatchConfig { max_attempts: 1, retry_base_secs: 0 },
        );
        let c = svc.create_campaign("t", "").unwrap();
        svc.send_campaign_now(&c.id).await.unwrap();

        registry.0.store(9000, Ordering::SeqCst);
        assert_eq!(svc.db().get_campaign(&c.id).unwrap().recipient_count, 50);
    }

    #[tokio::test]
    async fn test_schedule_campaign_rejects_past() {
        let (svc, _, _) = service(0, 0);
        let c = svc.create_campaign("t", "").unwrap();
        let err = svc
            .schedule_campaign(&c.id, Utc::now() - Duration::minutes(1))
            .unwrap_err();
        assert!(matches!(err, LexfrontError::InvalidTrigger(_)));
        assert_eq!(
            svc.db().get_campaign(&c.id).unwrap().state,
            CampaignState::Draft
        );
    }

    #[tokio::test]
    async fn test_cancel_campaign_schedule() {
        let (svc, _, _) = service(0, 0);
        let c = svc.create_campaign("t", "").unwrap();
        svc.schedule_campaign(&c.id, Utc::now() + Duration::hours(1))
            .unwrap();

        let cancelled = svc.cancel_campaign_schedule(&c.id).unwrap();
        assert_eq!(cancelled.state, CampaignState::Draft);
        assert!(cancelled.scheduled_for.is_none());

        // Cancel on a draft reports InvalidState.
        assert!(matches!(
            svc.cancel_campaign_schedule(&c.id),
            Err(LexfrontError::InvalidState(_))
        ));
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        assert_eq!(backoff_secs(2, 1), 2);
        assert_eq!(backoff_secs(2, 2), 4);
        assert_eq!(backoff_secs(2, 3), 8);
        // Oversized attempt budgets must neither panic nor overflow.
        assert_eq!(backoff_secs(2, 100), 2 * 1024);
        assert_eq!(backoff_secs(u64::MAX, 100), u64::MAX);
        assert_eq!(backoff_secs(0, 100), 0);
    }

    #[tokio::test]
    async fn test_schedule_loses_to_concurrent_send_claim() {
        let (svc, dispatcher, _) = service(10, 0);
        let c = svc.create_campaign("t", "").unwrap();

        // A send claims the row into `sending` right before the schedule's
        // conditional write lands.
        assert!(svc.db().claim_campaign_send(&c.id, 10, Utc::now()).unwrap());
        let err = svc
            .schedule_campaign(&c.id, Utc::now() + Duration::hours(1))
            .unwrap_err();
        assert!(matches!(err, LexfrontError::InvalidState(_)));

        // The claimed send concludes normally: no setback and no second
        // dispatch opportunity.
        assert_eq!(
            svc.db().get_campaign(&c.id).unwrap().state,
            CampaignState::Sending
        );
        svc.db().finish_campaign(&c.id, true, Utc::now()).unwrap();
        assert!(matches!(
            svc.send_campaign_now(&c.id).await,
            Err(LexfrontError::InvalidState(_))
        ));
        assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_error_outlives_finish_failure() {
        use async_trait::async_trait;

        // Concludes the row itself before erroring, so the caller's own
        // failure bookkeeping finds nothing left in `sending`.
        struct ConcludingDispatcher {
            db: Arc<SiteDb>,
        }

        #[async_trait]
        impl crate::notify::CampaignDispatcher for ConcludingDispatcher {
            async fn send(&self, c: &Campaign, _recipients: u32) -> Result<()> {
                self.db.finish_campaign(&c.id, false, Utc::now()).unwrap();
                Err(LexfrontError::Dispatch("connection reset".into()))
            }
        }

        let db = Arc::new(SiteDb::open_in_memory().unwrap());
        let svc = Lifecycle::new(
            db.clone(),
            Arc::new(FakeRegistry(AtomicU32::new(1))),
            Arc::new(ConcludingDispatcher { db: db.clone() }),
            Arc::new(FakeSearch::default()),
            "https://x",
            DispatchConfig { max_attempts: 1, retry_base_secs: 0 },
        );
        let c = svc.create_campaign("t", "").unwrap();

        // The root-cause dispatch error comes back, not the bookkeeping one.
        let err = svc.send_campaign_now(&c.id).await.unwrap_err();
        assert!(matches!(err, LexfrontError::Dispatch(_)));
        assert_eq!(db.get_campaign(&c.id).unwrap().state, CampaignState::Failed);
    }

    #[tokio::test]
    async fn test_scheduled_listings() {
        let (svc, _, _) = service(0, 0);
        let p = svc.create_post("a", "a", "").unwrap();
        svc.create_post("b", "b", "").unwrap();
        svc.schedule_post(&p.id, Utc::now() + Duration::hours(1))
            .unwrap();

        let c = svc.create_campaign("a", "").unwrap();
        svc.create_campaign("b", "").unwrap();
        svc.schedule_campaign(&c.id, Utc::now() + Duration::hours(1))
            .unwrap();

        assert_eq!(svc.list_scheduled_posts().unwrap().len(), 1);
        assert_eq!(svc.list_scheduled_campaigns().unwrap().len(), 1);
    }
}
