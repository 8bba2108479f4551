//! SQLite-backed persistent store for posts, campaigns, and subscribers.
//!
//! The engine makes every decision by reading current row state immediately
//! before acting, and every state transition is a conditional UPDATE keyed
//! on the expected current state. Whoever wins the write owns the
//! transition; the loser's affected-row count is zero.

use chrono::{DateTime, Utc};
use lexfront_core::error::{LexfrontError, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::campaign::{Campaign, CampaignState};
use crate::content::{Post, PostState};

/// Site database — posts, campaigns, and the subscriber list.
pub struct SiteDb {
    conn: Mutex<Connection>,
}

/// Shared SELECT column list for post queries — single source of truth.
const POST_SELECT: &str = "SELECT id, title, slug, body, state, publish_at, published_at, created_at, updated_at FROM posts";

/// Shared SELECT column list for campaign queries.
const CAMPAIGN_SELECT: &str = "SELECT id, subject, body_html, state, scheduled_for, sent_at, recipient_count, open_count, click_count, created_at, updated_at FROM campaigns";

// An unparseable stored timestamp maps to the epoch, never to a
// fabricated "now".
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Map a database row to a Post.
fn row_to_post(row: &rusqlite::Row) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        body: row.get(3)?,
        state: PostState::parse(&row.get::<_, String>(4)?),
        publish_at: parse_opt_ts(row.get(5)?),
        published_at: parse_opt_ts(row.get(6)?),
        created_at: parse_ts(&row.get::<_, String>(7)?),
        updated_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

/// Map a database row to a Campaign.
fn row_to_campaign(row: &rusqlite::Row) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        subject: row.get(1)?,
        body_html: row.get(2)?,
        state: CampaignState::parse(&row.get::<_, String>(3)?),
        scheduled_for: parse_opt_ts(row.get(4)?),
        sent_at: parse_opt_ts(row.get(5)?),
        recipient_count: row.get(6)?,
        open_count: row.get(7)?,
        click_count: row.get(8)?,
        created_at: parse_ts(&row.get::<_, String>(9)?),
        updated_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

impl SiteDb {
    /// Open or create the site database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| LexfrontError::Store(format!("DB open: {e}")))?;
        // WAL allows concurrent readers while the sweeper writes
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LexfrontError::Store(format!("DB open: {e}")))?;
        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LexfrontError::Store(format!("Lock: {e}")))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                body TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL DEFAULT 'draft',
                publish_at TEXT,
                published_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                body_html TEXT NOT NULL DEFAULT '',
                state TEXT NOT NULL DEFAULT 'draft',
                scheduled_for TEXT,
                sent_at TEXT,
                recipient_count INTEGER NOT NULL DEFAULT 0,
                open_count INTEGER NOT NULL DEFAULT 0,
                click_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subscribers (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'active',   -- active, unsubscribed
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_posts_due ON posts(state, publish_at);
            CREATE INDEX IF NOT EXISTS idx_campaigns_due ON campaigns(state, scheduled_for);
            ",
        )
        .map_err(|e| LexfrontError::Store(format!("Migration: {e}")))?;
        Ok(())
    }

    // ─── Posts ──────────────────────────────────────

    /// Insert a new post.
    pub fn insert_post(&self, post: &Post) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO posts (id, title, slug, body, state, publish_at, published_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                post.id,
                post.title,
                post.slug,
                post.body,
                post.state.as_str(),
                post.publish_at.map(|t| t.to_rfc3339()),
                post.published_at.map(|t| t.to_rfc3339()),
                post.created_at.to_rfc3339(),
                post.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| LexfrontError::Store(format!("Insert post: {e}")))?;
        Ok(())
    }

    /// Get a post by id.
    pub fn get_post(&self, id: &str) -> Result<Post> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{POST_SELECT} WHERE id=?1"),
            params![id],
            row_to_post,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LexfrontError::NotFound(format!("post {id}")),
            other => LexfrontError::Store(format!("Get post: {other}")),
        })
    }

    /// List all posts, newest first.
    pub fn list_posts(&self) -> Result<Vec<Post>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{POST_SELECT} ORDER BY created_at DESC"))
            .map_err(|e| LexfrontError::Store(format!("Prepare: {e}")))?;
        let posts = stmt
            .query_map([], row_to_post)
            .map_err(|e| LexfrontError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(posts)
    }

    /// Atomically set a draft post's trigger time. Returns false if the
    /// post was published between the caller's read and this write, so a
    /// stale schedule can never resurrect a trigger on a published row.
    pub fn set_post_trigger(
        &self,
        id: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE posts SET publish_at=?2, updated_at=?3 WHERE id=?1 AND state='draft'",
                params![id, at.to_rfc3339(), now.to_rfc3339()],
            )
            .map_err(|e| LexfrontError::Store(format!("Schedule post: {e}")))?;
        Ok(n > 0)
    }

    /// Atomically take a published post back to draft. Returns false if
    /// the post is not currently published.
    pub fn revert_post_publish(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE posts SET state='draft', published_at=NULL, publish_at=NULL, updated_at=?2
                 WHERE id=?1 AND state='published'",
                params![id, now.to_rfc3339()],
            )
            .map_err(|e| LexfrontError::Store(format!("Unpublish post: {e}")))?;
        Ok(n > 0)
    }

    /// Drafts whose trigger time has elapsed.
    pub fn due_posts(&self, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{POST_SELECT} WHERE state='draft' AND publish_at IS NOT NULL AND publish_at <= ?1 ORDER BY publish_at"
            ))
            .map_err(|e| LexfrontError::Store(format!("Prepare: {e}")))?;
        let posts = stmt
            .query_map(params![now.to_rfc3339()], row_to_post)
            .map_err(|e| LexfrontError::Store(format!("Query due posts: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(posts)
    }

    /// Atomically publish a draft. Returns true if this caller won the
    /// transition; false means the post was already published (idempotent
    /// path) — the row is only touched when the guard matches.
    pub fn claim_post_publish(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE posts SET state='published', published_at=?2, publish_at=NULL, updated_at=?2
                 WHERE id=?1 AND state='draft'",
                params![id, now.to_rfc3339()],
            )
            .map_err(|e| LexfrontError::Store(format!("Publish post: {e}")))?;
        Ok(n > 0)
    }

    /// Atomically clear a post's trigger time. Returns true if a trigger
    /// was actually cleared.
    pub fn clear_post_trigger(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE posts SET publish_at=NULL, updated_at=?2
                 WHERE id=?1 AND publish_at IS NOT NULL",
                params![id, now.to_rfc3339()],
            )
            .map_err(|e| LexfrontError::Store(format!("Cancel post schedule: {e}")))?;
        Ok(n > 0)
    }

    // ─── Campaigns ──────────────────────────────────────

    /// Insert a new campaign.
    pub fn insert_campaign(&self, c: &Campaign) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO campaigns (id, subject, body_html, state, scheduled_for, sent_at, recipient_count, open_count, click_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                c.id,
                c.subject,
                c.body_html,
                c.state.as_str(),
                c.scheduled_for.map(|t| t.to_rfc3339()),
                c.sent_at.map(|t| t.to_rfc3339()),
                c.recipient_count,
                c.open_count,
                c.click_count,
                c.created_at.to_rfc3339(),
                c.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| LexfrontError::Store(format!("Insert campaign: {e}")))?;
        Ok(())
    }

    /// Get a campaign by id.
    pub fn get_campaign(&self, id: &str) -> Result<Campaign> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{CAMPAIGN_SELECT} WHERE id=?1"),
            params![id],
            row_to_campaign,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                LexfrontError::NotFound(format!("campaign {id}"))
            }
            other => LexfrontError::Store(format!("Get campaign: {other}")),
        })
    }

    /// List all campaigns, newest first.
    pub fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{CAMPAIGN_SELECT} ORDER BY created_at DESC"))
            .map_err(|e| LexfrontError::Store(format!("Prepare: {e}")))?;
        let campaigns = stmt
            .query_map([], row_to_campaign)
            .map_err(|e| LexfrontError::Store(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(campaigns)
    }

    /// Atomically schedule a campaign. Guarded like the claim paths: if a
    /// concurrent send already moved the row to `sending` (or beyond),
    /// this matches nothing and the stale schedule loses.
    pub fn set_campaign_trigger(
        &self,
        id: &str,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaigns SET state='scheduled', scheduled_for=?2, updated_at=?3
                 WHERE id=?1 AND state IN ('draft','scheduled')",
                params![id, at.to_rfc3339(), now.to_rfc3339()],
            )
            .map_err(|e| LexfrontError::Store(format!("Schedule campaign: {e}")))?;
        Ok(n > 0)
    }

    /// Scheduled campaigns whose trigger time has elapsed.
    pub fn due_campaigns(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{CAMPAIGN_SELECT} WHERE state='scheduled' AND scheduled_for <= ?1 ORDER BY scheduled_for"
            ))
            .map_err(|e| LexfrontError::Store(format!("Prepare: {e}")))?;
        let campaigns = stmt
            .query_map(params![now.to_rfc3339()], row_to_campaign)
            .map_err(|e| LexfrontError::Store(format!("Query due campaigns: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(campaigns)
    }

    /// Atomically claim a campaign for sending: freeze the recipient
    /// snapshot and move to `sending` in one statement. Only one of two
    /// racing triggers can win this update; the loser gets false and must
    /// not dispatch.
    pub fn claim_campaign_send(
        &self,
        id: &str,
        recipients: u32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaigns SET state='sending', recipient_count=?2, scheduled_for=NULL, updated_at=?3
                 WHERE id=?1 AND state IN ('draft','scheduled')",
                params![id, recipients, now.to_rfc3339()],
            )
            .map_err(|e| LexfrontError::Store(format!("Claim send: {e}")))?;
        Ok(n > 0)
    }

    /// Atomically cancel a scheduled campaign. The WHERE clause is the
    /// answer to the cancel-vs-sweep race: if the sweep already claimed the
    /// row into `sending`, this update matches nothing and the caller is
    /// told the cancel lost.
    pub fn cancel_campaign_schedule(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE campaigns SET state='draft', scheduled_for=NULL, updated_at=?2
                 WHERE id=?1 AND state='scheduled'",
                params![id, now.to_rfc3339()],
            )
            .map_err(|e| LexfrontError::Store(format!("Cancel campaign: {e}")))?;
        Ok(n > 0)
    }

    /// Conclude a send: `sending -> sent` (with `sent_at`) or
    /// `sending -> failed`. The recipient snapshot is deliberately not in
    /// the SET list.
    pub fn finish_campaign(&self, id: &str, sent: bool, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let n = if sent {
            conn.execute(
                "UPDATE campaigns SET state='sent', sent_at=?2, updated_at=?2 WHERE id=?1 AND state='sending'",
                params![id, now.to_rfc3339()],
            )
        } else {
            conn.execute(
                "UPDATE campaigns SET state='failed', updated_at=?2 WHERE id=?1 AND state='sending'",
                params![id, now.to_rfc3339()],
            )
        }
        .map_err(|e| LexfrontError::Store(format!("Finish campaign: {e}")))?;
        if n == 0 {
            return Err(LexfrontError::InvalidState(format!(
                "campaign {id} is not sending"
            )));
        }
        Ok(())
    }

    /// Increment the open counter (analytics pixel callback).
    pub fn record_open(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET open_count = open_count + 1 WHERE id=?1",
            params![id],
        )
        .map_err(|e| LexfrontError::Store(format!("Record open: {e}")))?;
        Ok(())
    }

    /// Increment the click counter (tracked-link redirect).
    pub fn record_click(&self, id: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE campaigns SET click_count = click_count + 1 WHERE id=?1",
            params![id],
        )
        .map_err(|e| LexfrontError::Store(format!("Record click: {e}")))?;
        Ok(())
    }

    // ─── Subscribers ──────────────────────────────────────

    /// Add (or re-activate) a newsletter subscriber.
    pub fn add_subscriber(&self, email: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO subscribers (id, email, status, created_at) VALUES (?1, ?2, 'active', ?3)
             ON CONFLICT(email) DO UPDATE SET status='active'",
            params![
                format!("sub-{}", uuid::Uuid::new_v4()),
                email,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| LexfrontError::Store(format!("Add subscriber: {e}")))?;
        Ok(())
    }

    /// Mark a subscriber as unsubscribed. Returns true if a row changed.
    pub fn unsubscribe(&self, email: &str) -> Result<bool> {
        let conn = self.lock()?;
        let n = conn
            .execute(
                "UPDATE subscribers SET status='unsubscribed' WHERE email=?1 AND status='active'",
                params![email],
            )
            .map_err(|e| LexfrontError::Store(format!("Unsubscribe: {e}")))?;
        Ok(n > 0)
    }

    /// Count active subscribers — the value frozen into a campaign's
    /// recipient snapshot at send time.
    pub fn count_active_subscribers(&self) -> Result<u32> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM subscribers WHERE status='active'",
            [],
            |row| row.get::<_, u32>(0),
        )
        .map_err(|e| LexfrontError::Store(format!("Count subscribers: {e}")))
    }
}
